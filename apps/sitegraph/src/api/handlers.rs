//! # API Endpoint Handlers
//!
//! The site fallback handler turns any path into a dispatch; the admin
//! handlers expose snapshots, routes and the cache.

use super::{
    AppState, ROLE_HEADER, USER_HEADER,
    middleware::QuotaExceeded,
    types::{
        ErrorResponse, FaultResponse, FlushResponse, HealthResponse, RoleQuery, RouteJson,
        RoutesResponse, SiteResponse, SnapshotResponse, StatusResponse, TreeResponse,
    },
};
use crate::service::{Served, SiteService};
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use sitegraph_core::{
    AccessFault, Action, MenuBuilder, NodeId, RequestContext, RoleId, SiteConfig, SiteError,
    snapshot_fingerprint,
};
use std::sync::Arc;

// =============================================================================
// HELPERS
// =============================================================================

/// Run synchronous service work on the blocking pool.
async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, SiteError>
where
    F: FnOnce(&SiteService) -> Result<T, SiteError> + Send + 'static,
    T: Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || work(&service))
        .await
        .map_err(|e| SiteError::IoError(format!("Blocking task failed: {}", e)))?
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Requester context from the role and user headers.
///
/// A user header marks the request as authenticated.
fn request_context(headers: &HeaderMap, raw_uri: &str, site: &SiteConfig) -> RequestContext {
    let role = RoleId::new(header_text(headers, ROLE_HEADER).unwrap_or(&site.guest_role));
    match header_text(headers, USER_HEADER) {
        Some(user) => RequestContext::authenticated(role, raw_uri, user),
        None => RequestContext::anonymous(role, raw_uri),
    }
}

fn role_or_guest(query: &RoleQuery, service: &SiteService) -> RoleId {
    query
        .role
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(RoleId::new)
        .unwrap_or_else(|| service.guest_role())
}

fn internal_error(e: &SiteError) -> Response {
    tracing::error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(e.to_string())),
    )
        .into_response()
}

/// HTTP answer for a dispatch outcome.
fn site_outcome(result: Result<Served, SiteError>, site: &SiteConfig) -> Response {
    match result {
        Ok(served) => {
            let location = match &served.action {
                Action::Redirect { url, .. } => Some(url.clone()),
                _ => None,
            };
            let body = Json(SiteResponse::from(served));
            match location {
                Some(url) => match HeaderValue::from_str(&url) {
                    Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)], body).into_response(),
                    Err(e) => internal_error(&SiteError::ControllerFailed(format!(
                        "Invalid redirect target '{}': {}",
                        url, e
                    ))),
                },
                None => (StatusCode::OK, body).into_response(),
            }
        }
        Err(SiteError::Halted(fault)) => {
            let status =
                StatusCode::from_u16(fault.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            tracing::debug!(status = %status, fault = %fault, "request halted");
            (status, Json(FaultResponse::new(fault, site))).into_response()
        }
        Err(e) => internal_error(&e),
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// SITE HANDLER
// =============================================================================

/// Resolve and dispatch any non-admin path.
pub async fn site_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let raw_uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let site = state.service.site().clone();
    let ctx = request_context(request.headers(), &raw_uri, &site);
    let halt = request
        .extensions()
        .get::<QuotaExceeded>()
        .map(|_| AccessFault::RateLimited);

    let result = run_blocking(&state, move |service| service.serve(ctx, halt)).await;
    site_outcome(result, &site)
}

// =============================================================================
// ADMIN HANDLERS
// =============================================================================

/// Route table and aliases of a role's snapshot.
pub async fn routes_handler(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> Response {
    let result = run_blocking(&state, move |service| {
        let role = role_or_guest(&query, service);
        let graph = service.graph(&role)?;
        Ok(RoutesResponse {
            routes: graph.routes().routes().map(RouteJson::from).collect(),
            aliases: graph
                .aliases()
                .iter()
                .map(|(slug, node)| (slug.to_string(), node))
                .collect(),
            role: role.0,
        })
    })
    .await;

    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// Encoded snapshot of a role.
pub async fn snapshot_handler(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> impl IntoResponse {
    let role = role_or_guest(&query, &state.service);
    let name = role.0.clone();
    let result = run_blocking(&state, move |service| service.snapshot_bytes(&role)).await;

    match result {
        Ok(bytes) => {
            let fingerprint = snapshot_fingerprint(&bytes);
            (
                StatusCode::OK,
                Json(SnapshotResponse::success(name, bytes, fingerprint)),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SnapshotResponse::error(name, format!("Snapshot failed: {}", e))),
        ),
    }
}

/// Unfiltered menu tree of a role below `?root=` (default: top level).
pub async fn tree_handler(State(state): State<AppState>, Query(query): Query<RoleQuery>) -> Response {
    let result = run_blocking(&state, move |service| {
        let role = role_or_guest(&query, service);
        let root = NodeId(query.root.unwrap_or(0));
        let graph = service.graph(&role)?;
        Ok(TreeResponse {
            items: MenuBuilder::unfiltered(&graph).menu(root, None),
            root,
            role: role.0,
        })
    })
    .await;

    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// Flush one role (`?role=`) or every role.
pub async fn flush_handler(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> impl IntoResponse {
    let role = query.role.filter(|r| !r.is_empty());
    let target = role.clone();
    let result = run_blocking(&state, move |service| {
        service.flush(target.map(RoleId::new).as_ref())
    })
    .await;

    match result {
        Ok(()) => {
            tracing::info!(role = ?role, "snapshot cache flushed");
            (
                StatusCode::OK,
                Json(FlushResponse {
                    success: true,
                    role,
                    error: None,
                }),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(FlushResponse {
                success: false,
                role,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Store, cache and transaction counters.
pub async fn status_handler(State(state): State<AppState>) -> Response {
    match run_blocking(&state, StatusResponse::collect).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => internal_error(&e),
    }
}
