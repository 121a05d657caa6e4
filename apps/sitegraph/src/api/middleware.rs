//! # Middleware Module
//!
//! Request quota for the sitegraph HTTP server.
//!
//! Site requests over quota are not rejected here. They are marked, and the
//! mark becomes a `RateLimited` halt inside dispatch, so the requester gets
//! the site's own teapot response. Admin requests over quota are answered
//! with 418 directly.
//!
//! ## Configuration
//!
//! - `SITEGRAPH_RATE_LIMIT`: Requests per second (default from config: 100)

use super::ADMIN_PREFIX;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default rate limit: 100 requests per second.
const DEFAULT_RPS: NonZeroU32 = match NonZeroU32::new(100) {
    Some(rps) => rps,
    None => NonZeroU32::MIN,
};

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Request extension set on site requests that exceeded the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded;

/// Create a new global rate limiter. Zero falls back to the default.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    let quota = Quota::per_second(rps);
    Arc::new(RateLimiter::direct(quota))
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.check().is_ok() {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    tracing::warn!(path = %path, "Rate limit exceeded");
    if path.starts_with(ADMIN_PREFIX) {
        return Err((StatusCode::IM_A_TEAPOT, "Rate limit exceeded"));
    }
    request.extensions_mut().insert(QuotaExceeded);
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================
