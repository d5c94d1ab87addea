/// Avenir waitlist server
use avenir_waitlist::{config::ServerConfig, context::AppContext, error::WaitlistResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> WaitlistResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
     _                    _
    / \__   _____ _ __  (_)_ __
   / _ \ \ / / _ \ '_ \ | | '__|
  / ___ \ V /  __/ | | || | |
 /_/   \_\_/ \___|_| |_||_|_|

        Waitlist Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
