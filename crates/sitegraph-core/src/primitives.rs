//! # Primitives
//!
//! Compiled-in constants of the routing engine.
//!
//! These values are part of the on-disk and on-wire contract: changing the
//! capture syntax, cache key layout or snapshot header breaks cached graphs.

/// Id of the root sentinel node.
///
/// Top-level nodes have this as parent, and link chasing falls back to it
/// when a cycle cannot be escaped through the parent chain.
pub const ROOT_NODE_ID: u64 = 0;

/// Opening of a named capture segment in a route pattern (`<:name>`).
pub const CAPTURE_OPEN: &str = "<:";

/// Closing of a named capture segment in a route pattern.
pub const CAPTURE_CLOSE: &str = ">";

/// Legacy entry script recognised with the `m` query parameter.
pub const LEGACY_SCRIPT: &str = "index.php";

/// Query parameter carrying a direct node id in the legacy form.
pub const LEGACY_NODE_PARAM: &str = "m";

/// Prefix shared by every cached graph key.
pub const GRAPH_CACHE_PREFIX: &str = "sitegraph:";

/// Namespace of per-role keys, `sitegraph:role:{role}`.
pub const ROLE_CACHE_NAMESPACE: &str = "role:";

/// Key suffix for the permission-free graph, outside the role namespace.
pub const UNFILTERED_CACHE_SUFFIX: &str = "unfiltered";

/// Layout used for widget ajax responses.
pub const WIDGET_LAYOUT: &str = "widget";

/// Layout shared by html and lightbox ajax responses.
pub const BARE_LAYOUT: &str = "bare";

/// Magic bytes for the snapshot header.
///
/// - Header = Magic Bytes ("SGRF") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"SGRF";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to `NodeGraph` serialization.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum number of nodes visited when walking a parent chain.
///
/// Parent pointers come from operator data and may be corrupt; walks stop
/// here instead of spinning.
pub const MAX_TREE_DEPTH: usize = 1000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of an alias slug.
pub const MAX_ALIAS_LENGTH: usize = 255;

/// Maximum number of segments considered in a request path.
///
/// Longer paths match no route.
pub const MAX_PATH_SEGMENTS: usize = 64;
