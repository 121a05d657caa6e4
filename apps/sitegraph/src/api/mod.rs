//! # sitegraph HTTP API Module
//!
//! HTTP server over the site graph, using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /_admin/status` - Store, cache and transaction counters
//! - `GET /_admin/routes?role=` - Route table and aliases of a role
//! - `GET /_admin/snapshot?role=` - Encoded snapshot (base64) with fingerprint
//! - `GET /_admin/tree?role=&root=` - Menu tree of a role
//! - `POST /_admin/flush?role=` - Drop cached snapshots
//! - anything else - resolved and dispatched as a site page
//!
//! ## Requester
//!
//! - `X-Site-Role`: permission role (default: the configured guest role)
//! - `X-Site-User`: authenticated user; absent means anonymous
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `SITEGRAPH_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `SITEGRAPH_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `SITEGRAPH_API_KEY`: If set, admin endpoints require Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::get_api_key_from_env;
pub use middleware::{GlobalRateLimiter, QuotaExceeded, create_rate_limiter};
pub use types::{
    ErrorResponse, FaultResponse, FlushResponse, HealthResponse, RoleQuery, RouteJson,
    RoutesResponse, SiteResponse, SnapshotResponse, StatusResponse, TransactionCounts,
    TreeResponse,
};

use crate::config::AppConfig;
use crate::service::SiteService;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use sitegraph_core::SiteError;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Path prefix of the admin endpoints.
pub const ADMIN_PREFIX: &str = "/_admin";

/// Header carrying the requester's role.
pub const ROLE_HEADER: &str = "x-site-role";

/// Header carrying the authenticated user.
pub const USER_HEADER: &str = "x-site-user";

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SiteService>,
}

impl AppState {
    #[must_use]
    pub fn new(service: SiteService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer.
///
/// - `"*"`: allows all origins (development only)
/// - unset: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (SITEGRAPH_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                restricted_cors().allow_origin(allowed_origins)
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn restricted_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(ROLE_HEADER),
            HeaderName::from_static(USER_HEADER),
        ])
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    restricted_cors().allow_origin(origins)
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting - marks or rejects requests over quota (if enabled)
/// 4. Authentication - validates API key on admin endpoints (if configured)
pub fn create_router(state: AppState, config: &AppConfig) -> Router {
    let cors = build_cors_layer(config.cors_origins().as_deref());

    let rate_limit = config.rate_limit();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled for {}", ADMIN_PREFIX);
    } else {
        tracing::warn!(
            "Admin authentication DISABLED - {} endpoints are publicly accessible! \
             Set SITEGRAPH_API_KEY environment variable to enable authentication.",
            ADMIN_PREFIX
        );
    }

    let mut admin = Router::new()
        .route("/_admin/status", get(handlers::status_handler))
        .route("/_admin/routes", get(handlers::routes_handler))
        .route("/_admin/snapshot", get(handlers::snapshot_handler))
        .route("/_admin/tree", get(handlers::tree_handler))
        .route("/_admin/flush", post(handlers::flush_handler));
    if has_auth {
        admin = admin.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(admin)
        .fallback(handlers::site_handler);

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, service: SiteService, config: &AppConfig) -> Result<(), SiteError> {
    let state = AppState::new(service);
    let router = create_router(state, config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SiteError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("sitegraph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| SiteError::IoError(format!("Server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layers_build_for_every_setting() {
        let _ = build_cors_layer(None);
        let _ = build_cors_layer(Some("*"));
        let _ = build_cors_layer(Some("https://example.org, http://localhost:3000"));
        let _ = build_cors_layer(Some("\u{7f}"));
    }
}
