//! # API Request/Response Types
//!
//! JSON structures of the site front end and the admin endpoints.

use crate::service::{Served, SiteService};
use serde::{Deserialize, Serialize};
use sitegraph_core::{
    AccessFault, Action, AjaxMode, MenuItem, NodeId, RouteDescriptor, RouteParams, SiteConfig,
    SiteError,
};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// SITE RESPONSES
// =============================================================================

/// A dispatched page, handed to whatever renders it.
#[derive(Debug, Clone, Serialize)]
pub struct SiteResponse {
    pub node: NodeId,
    pub action: Action,
    pub ajax: Option<AjaxMode>,
    pub layout: Option<String>,
    pub notices: Vec<String>,
    pub breadcrumbs: Vec<MenuItem>,
}

impl From<Served> for SiteResponse {
    fn from(served: Served) -> Self {
        Self {
            node: served.action.node(),
            ajax: served.ajax,
            layout: served.layout.map(str::to_string),
            notices: served.notices,
            breadcrumbs: served.breadcrumbs,
            action: served.action,
        }
    }
}

/// Body of a 401/403/404/418 answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultResponse {
    pub error: String,
    pub status: u16,
    pub fault: AccessFault,
    /// Where to log in, for unauthenticated requesters.
    pub login_url: Option<String>,
}

impl FaultResponse {
    #[must_use]
    pub fn new(fault: AccessFault, site: &SiteConfig) -> Self {
        let login_url = match &fault {
            AccessFault::Unauthenticated { node } => Some(site.login_url(*node)),
            _ => None,
        };
        Self {
            error: fault.to_string(),
            status: fault.status_code(),
            fault,
            login_url,
        }
    }
}

/// Body of a 500 answer or a failed admin call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

// =============================================================================
// ADMIN REQUESTS
// =============================================================================

/// `?role=` (and `?root=` for trees) on admin endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleQuery {
    pub role: Option<String>,
    pub root: Option<u64>,
}

// =============================================================================
// ADMIN RESPONSES
// =============================================================================

/// One route table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteJson {
    pub catcher: NodeId,
    pub pattern: String,
    pub module: Option<String>,
    pub defaults: Option<RouteParams>,
}

impl From<&RouteDescriptor> for RouteJson {
    fn from(route: &RouteDescriptor) -> Self {
        Self {
            catcher: route.catcher,
            pattern: route.pattern.clone(),
            module: route.module.clone(),
            defaults: route.defaults.clone(),
        }
    }
}

/// Route table and alias index of one role's snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesResponse {
    pub role: String,
    pub routes: Vec<RouteJson>,
    pub aliases: BTreeMap<String, NodeId>,
}

/// Encoded snapshot of one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub success: bool,
    pub role: String,
    pub size: usize,
    pub data: Option<String>, // Base64 encoded
    pub fingerprint: Option<String>,
    pub error: Option<String>,
}

impl SnapshotResponse {
    pub fn success(role: impl Into<String>, data: Vec<u8>, fingerprint: String) -> Self {
        Self {
            success: true,
            role: role.into(),
            size: data.len(),
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &data,
            )),
            fingerprint: Some(fingerprint),
            error: None,
        }
    }

    pub fn error(role: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            role: role.into(),
            size: 0,
            data: None,
            fingerprint: None,
            error: Some(msg.into()),
        }
    }
}

/// Menu tree of one role.
#[derive(Debug, Clone, Serialize)]
pub struct TreeResponse {
    pub role: String,
    pub root: NodeId,
    pub items: Vec<MenuItem>,
}

/// Result of a cache flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResponse {
    pub success: bool,
    /// Role flushed, or `None` for every role.
    pub role: Option<String>,
    pub error: Option<String>,
}

/// Transaction counters since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCounts {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

/// Store and cache status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub rows: usize,
    pub grants: usize,
    pub roles: Vec<String>,
    pub cached_snapshots: Vec<String>,
    pub held_snapshots: usize,
    pub transactions: TransactionCounts,
}

impl StatusResponse {
    /// Gather counters from the store, the cache and the service.
    pub fn collect(service: &SiteService) -> Result<Self, SiteError> {
        let transactions = service.transactions();
        Ok(Self {
            rows: service.store().row_count()?,
            grants: service.store().grant_count()?,
            roles: service
                .store()
                .roles()?
                .into_iter()
                .map(|r| r.0)
                .collect(),
            cached_snapshots: service.cache().keys()?,
            held_snapshots: service.held_snapshots()?,
            transactions: TransactionCounts {
                begun: transactions.begun(),
                committed: transactions.committed(),
                rolled_back: transactions.rolled_back(),
            },
        })
    }
}
