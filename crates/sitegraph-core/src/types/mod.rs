//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the site graph:
//! - Identifiers (`NodeId`, `RoleId`)
//! - Node classification (`NodeType`, `HideType`, `AjaxMode`)
//! - The in-graph `Node` record and the persisted `NodeRow`
//! - Fault and error types (`AccessFault`, `SiteError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can key `BTreeMap`s,
//! which keeps snapshot encoding byte-stable across builds.

use crate::primitives;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable identifier of a node in the site tree.
///
/// `NodeId(0)` is the root sentinel: it is the parent of every top-level
/// node and the fallback result of link chasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The root sentinel.
    pub const ROOT: Self = Self(primitives::ROOT_NODE_ID);

    /// True for the root sentinel.
    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == primitives::ROOT_NODE_ID
    }

    /// Parse a decimal node id, as found in the legacy `?m=` parameter.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permission group of a requester.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl RoleId {
    /// Create a role id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the role as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Roles must be non-empty to scope a graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// NODE TYPE
// =============================================================================

/// The twelve execution strategies a node can carry.
///
/// The discriminants are the values stored in the `node_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum NodeType {
    StandardPage = 1,
    PlainLink = 2,
    JumpTo = 3,
    ExternalFile = 4,
    ExternalUrl = 5,
    Placeholder = 6,
    Iframe = 7,
    Cron = 8,
    WidgetAjax = 9,
    HtmlAjax = 10,
    LightboxAjax = 11,
    RawAjax = 12,
}

impl NodeType {
    /// Every variant in column order.
    pub const ALL: [Self; 12] = [
        Self::StandardPage,
        Self::PlainLink,
        Self::JumpTo,
        Self::ExternalFile,
        Self::ExternalUrl,
        Self::Placeholder,
        Self::Iframe,
        Self::Cron,
        Self::WidgetAjax,
        Self::HtmlAjax,
        Self::LightboxAjax,
        Self::RawAjax,
    ];

    /// Column value of this type.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Types whose `extend` names another node to dispatch instead.
    #[must_use]
    pub const fn is_indirect(self) -> bool {
        matches!(self, Self::PlainLink | Self::JumpTo | Self::Placeholder)
    }

    /// Jump and placeholder nodes lend their alias and href to their target.
    #[must_use]
    pub const fn forwards_alias(self) -> bool {
        matches!(self, Self::JumpTo | Self::Placeholder)
    }

    /// The ajax rendering mode recorded before execution, if any.
    #[must_use]
    pub const fn ajax_mode(self) -> Option<AjaxMode> {
        match self {
            Self::WidgetAjax => Some(AjaxMode::Widget),
            Self::HtmlAjax => Some(AjaxMode::Html),
            Self::LightboxAjax => Some(AjaxMode::Lightbox),
            Self::RawAjax => Some(AjaxMode::Raw),
            _ => None,
        }
    }

    /// Short lowercase name, used in logs and JSON.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::StandardPage => "standard-page",
            Self::PlainLink => "plain-link",
            Self::JumpTo => "jump-to",
            Self::ExternalFile => "external-file",
            Self::ExternalUrl => "external-url",
            Self::Placeholder => "placeholder",
            Self::Iframe => "iframe",
            Self::Cron => "cron",
            Self::WidgetAjax => "widget-ajax",
            Self::HtmlAjax => "html-ajax",
            Self::LightboxAjax => "lightbox-ajax",
            Self::RawAjax => "raw-ajax",
        }
    }
}

impl TryFrom<u8> for NodeType {
    type Error = SiteError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.code() == value)
            .ok_or(SiteError::InvalidNodeType(value))
    }
}

impl From<NodeType> for u8 {
    fn from(value: NodeType) -> Self {
        value.code()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// VISIBILITY & AJAX MODE
// =============================================================================

/// Menu visibility policy of a node.
///
/// Visibility only affects menu construction; resolution is governed by
/// the permission table alone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum HideType {
    #[default]
    Visible,
    Hidden,
    MembersOnly,
    GuestsOnly,
}

impl HideType {
    /// Decode the `hide` column. Unknown values are treated as visible.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Hidden,
            2 => Self::MembersOnly,
            3 => Self::GuestsOnly,
            _ => Self::Visible,
        }
    }

    /// Whether a menu entry is shown to a requester.
    #[must_use]
    pub const fn shows_for(self, authenticated: bool) -> bool {
        match self {
            Self::Visible => true,
            Self::Hidden => false,
            Self::MembersOnly => authenticated,
            Self::GuestsOnly => !authenticated,
        }
    }
}

/// Which ajax rendering mode the templating collaborator should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AjaxMode {
    Widget,
    Html,
    Lightbox,
    Raw,
}

impl AjaxMode {
    /// Layout handed to the templating collaborator.
    ///
    /// Html and lightbox share the bare layout; raw output gets none.
    #[must_use]
    pub const fn layout(self) -> Option<&'static str> {
        match self {
            Self::Widget => Some(primitives::WIDGET_LAYOUT),
            Self::Html | Self::Lightbox => Some(primitives::BARE_LAYOUT),
            Self::Raw => None,
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

/// A node of a role's site graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// `NodeId::ROOT` for top-level nodes.
    pub parent_id: NodeId,
    pub name: String,
    /// Controller or file reference, or absolute URL for external links.
    pub link: String,
    /// Owning plugin (module).
    pub plugin: String,
    pub node_type: NodeType,
    /// Secondary node id. For iframes this is the frame height.
    pub extend: Option<NodeId>,
    pub new_window: bool,
    pub alias: Option<String>,
    pub route: Option<String>,
    pub hide_type: HideType,
    pub rank: i64,
    pub theme_folder: String,
    pub layout: String,
    /// Entity-decoded parameter blob (JSON text when present).
    pub params: String,
    /// Precomputed URL of this node.
    pub href: String,
}

impl Node {
    /// Parse `params` as JSON. Empty or malformed blobs yield `None`.
    #[must_use]
    pub fn params_json(&self) -> Option<serde_json::Value> {
        if self.params.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.params).ok()
    }

    /// `extend` as a meaningful indirection target.
    #[must_use]
    pub fn indirection_target(&self) -> Option<NodeId> {
        if self.node_type.is_indirect() {
            self.extend.filter(|e| !e.is_root())
        } else {
            None
        }
    }
}

// =============================================================================
// PERSISTED ROW
// =============================================================================

/// One row of the persisted node table.
///
/// Field names follow the storage columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeRow {
    pub node_id: u64,
    pub parent_node_id: u64,
    pub node_name: String,
    pub node_link: String,
    pub plugin: String,
    pub node_type: u8,
    pub extend: Option<u64>,
    pub new_window: bool,
    pub rank: i64,
    pub hide: u8,
    pub theme_id: String,
    pub alias: Option<String>,
    pub layout: String,
    /// Entity-encoded parameter blob.
    pub params: String,
    pub route: Option<String>,
}

impl NodeRow {
    /// Minimal row with the given id, parent and type.
    #[must_use]
    pub fn new(node_id: u64, parent_node_id: u64, node_type: NodeType) -> Self {
        Self {
            node_id,
            parent_node_id,
            node_type: node_type.code(),
            ..Self::default()
        }
    }

    /// Builder helper: set the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    /// Builder helper: set plugin and link.
    #[must_use]
    pub fn linking(mut self, plugin: impl Into<String>, link: impl Into<String>) -> Self {
        self.plugin = plugin.into();
        self.node_link = link.into();
        self
    }

    /// Builder helper: set the alias.
    #[must_use]
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Builder helper: set the route pattern.
    #[must_use]
    pub fn routed(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Builder helper: set the extend pointer.
    #[must_use]
    pub fn extending(mut self, extend: u64) -> Self {
        self.extend = Some(extend);
        self
    }

    /// Builder helper: set the rank.
    #[must_use]
    pub fn ranked(mut self, rank: i64) -> Self {
        self.rank = rank;
        self
    }
}

// =============================================================================
// REQUEST CONTEXT
// =============================================================================

/// Explicit per-request state threaded from resolution into dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub role: RoleId,
    pub raw_uri: String,
    pub authenticated: bool,
    pub user: Option<String>,
}

impl RequestContext {
    /// Anonymous request under the given role.
    #[must_use]
    pub fn anonymous(role: RoleId, raw_uri: impl Into<String>) -> Self {
        Self {
            role,
            raw_uri: raw_uri.into(),
            authenticated: false,
            user: None,
        }
    }

    /// Authenticated request for `user` under the given role.
    #[must_use]
    pub fn authenticated(role: RoleId, raw_uri: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            role,
            raw_uri: raw_uri.into(),
            authenticated: true,
            user: Some(user.into()),
        }
    }
}

// =============================================================================
// FAULTS & ERRORS
// =============================================================================

/// Typed access fault raised instead of executing a node.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum AccessFault {
    /// Nothing matches, even ignoring permissions.
    #[error("No node matches '{path}'")]
    NotFound { path: String },

    /// The node exists but the authenticated role may not see it.
    #[error("Access to node {node} is forbidden")]
    Forbidden { node: NodeId },

    /// The node exists and the requester must log in first.
    #[error("Login required for node {node}")]
    Unauthenticated { node: NodeId },

    /// Request quota exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

impl AccessFault {
    /// HTTP status equivalent of the fault.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Forbidden { .. } => 403,
            Self::Unauthenticated { .. } => 401,
            Self::RateLimited => 418,
        }
    }
}

/// Errors that can occur in sitegraph.
///
/// Everything fallible returns `Result<T, SiteError>`; the core never panics.
#[derive(Debug, Error)]
pub enum SiteError {
    /// Graph building requires a role.
    #[error("no role given")]
    NoRole,

    /// A row carries a `node_type` outside 1..=12.
    #[error("Invalid node type: {0}")]
    InvalidNodeType(u8),

    /// The requested node is not part of the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Neither conventional controller path is registered.
    #[error("No controller for node {node} (tried {tried:?})")]
    ControllerMissing { node: NodeId, tried: Vec<String> },

    /// An external-file node references a file that cannot be read.
    #[error("Include file missing for node {node}: {path}")]
    IncludeMissing { node: NodeId, path: String },

    /// A redispatch landed on another indirection.
    #[error("Indirection from node {0} did not reach a terminal node")]
    UnterminatedIndirection(NodeId),

    /// Dispatch was aborted by a halt condition.
    #[error("Dispatch halted: {0}")]
    Halted(AccessFault),

    /// A controller reported a failure.
    #[error("Controller failed: {0}")]
    ControllerFailed(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<AccessFault> for SiteError {
    fn from(fault: AccessFault) -> Self {
        Self::Halted(fault)
    }
}

// =============================================================================
// TESTS
// =============================================================================
