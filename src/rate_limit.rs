/// Rate Limiting System
use crate::{
    config::RateLimitConfig,
    error::{WaitlistError, WaitlistResult},
};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

fn non_zero(value: u32, fallback: u32) -> NonZeroU32 {
    NonZeroU32::new(value)
        .or_else(|| NonZeroU32::new(fallback))
        .unwrap_or(NonZeroU32::MIN)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    writes: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    reads: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        // Signups get a fraction of the burst reads get
        let write_quota = Quota::per_second(non_zero(config.write_rps, 5))
            .allow_burst(non_zero(config.burst_size / 2, 10));
        let read_quota = Quota::per_second(non_zero(config.read_rps, 50))
            .allow_burst(non_zero(config.burst_size, 20));

        Self {
            enabled: config.enabled,
            writes: Arc::new(GovernorLimiter::direct(write_quota)),
            reads: Arc::new(GovernorLimiter::direct(read_quota)),
        }
    }

    /// Check rate limit for state-changing requests
    pub fn check_write(&self) -> WaitlistResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.writes
            .check()
            .map_err(|_| WaitlistError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            })
    }

    /// Check rate limit for read requests
    pub fn check_read(&self) -> WaitlistResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.reads
            .check()
            .map_err(|_| WaitlistError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let result = if request.method() == Method::POST {
        ctx.rate_limiter.check_write()
    } else {
        ctx.rate_limiter.check_read()
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), "rate_limited");
            e.into_response()
        }
    }
}
