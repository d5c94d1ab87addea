/// Application context and dependency injection
use crate::{
    config::{ServerConfig, StoreBackendConfig},
    db,
    error::{WaitlistError, WaitlistResult},
    mailer::Mailer,
    rate_limit::RateLimiter,
    waitlist::{MemoryWaitlistStore, SqliteWaitlistStore, WaitlistService, WaitlistStore},
};
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub waitlist: Arc<WaitlistService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> WaitlistResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directory if it doesn't exist
        Self::ensure_directories(&config).await?;

        let store = Self::open_store(&config.storage.backend).await?;
        Self::with_store(config, store)
    }

    /// Build a context around an already-open store
    pub fn with_store(config: ServerConfig, store: Arc<dyn WaitlistStore>) -> WaitlistResult<Self> {
        let waitlist = Arc::new(WaitlistService::new(store, config.waitlist.clone()));

        // Initialize rate limiter
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        // Initialize mailer
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config: Arc::new(config),
            waitlist,
            rate_limiter,
            mailer,
        })
    }

    async fn open_store(backend: &StoreBackendConfig) -> WaitlistResult<Arc<dyn WaitlistStore>> {
        match backend {
            StoreBackendConfig::Sqlite {
                path,
                max_connections,
            } => {
                let pool = db::create_pool(
                    path,
                    db::DatabaseOptions {
                        max_connections: *max_connections,
                        ..Default::default()
                    },
                )
                .await?;

                // Run migrations
                db::run_migrations(&pool).await?;

                // Test connection
                db::test_connection(&pool).await?;

                tracing::info!(path = %path.display(), "Using SQLite waitlist store");
                Ok(Arc::new(SqliteWaitlistStore::new(pool)))
            }
            StoreBackendConfig::Memory => {
                tracing::warn!("Using in-memory waitlist store - signups are lost on restart");
                Ok(Arc::new(MemoryWaitlistStore::new()))
            }
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> WaitlistResult<()> {
        if let StoreBackendConfig::Sqlite { .. } = config.storage.backend {
            let dir = &config.storage.data_directory;
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    WaitlistError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
                })?;
            }
        }

        Ok(())
    }

    /// Get bind address
    pub fn bind_address(&self) -> String {
        format!(
            "{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }

    /// Public base for links in outgoing mail
    pub fn public_base_url(&self, request_origin: Option<&str>) -> String {
        self.config
            .waitlist
            .base_url
            .as_deref()
            .or(request_origin)
            .unwrap_or(crate::waitlist::service::DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }
}
