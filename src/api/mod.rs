/// API routes and handlers
pub mod health;
pub mod waitlist;

use crate::{context::AppContext, rate_limit::rate_limit_middleware};
use axum::{middleware, Router};

/// Build API routes
///
/// Only the waitlist endpoints are rate limited; probes must keep
/// answering while the landing page is busy.
pub fn routes(ctx: &AppContext) -> Router<AppContext> {
    let waitlist = waitlist::routes().route_layer(middleware::from_fn_with_state(
        ctx.clone(),
        rate_limit_middleware,
    ));

    Router::new().merge(health::routes()).merge(waitlist)
}
