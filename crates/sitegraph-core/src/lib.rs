//! # sitegraph-core
//!
//! The routing and dispatch engine for sitegraph - THE LOGIC.
//!
//! A site is a tree of nodes. Each role sees the subset of nodes its
//! permissions allow; that subset is assembled into an immutable
//! `NodeGraph` (adjacency, alias index, route table) and cached as a
//! snapshot. Requests flow through:
//!
//! ```text
//! raw URI -> Resolver -> node id -> Dispatcher -> Action
//!                                      |
//!                                  LinkChaser (link / jump / placeholder)
//! ```
//!
//! ## Architectural Constraints
//!
//! - Synchronous: NO async, NO network dependencies
//! - Deterministic: `BTreeMap`/`BTreeSet` only, identical rows give
//!   byte-identical snapshots
//! - Collaborators (node source, cache, file loader, transactions, cron
//!   ledger) are injected at construction, never looked up globally

// =============================================================================
// MODULES
// =============================================================================

pub mod alias;
pub mod builder;
pub mod cache;
pub mod chaser;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod formats;
pub mod graph;
pub mod menu;
pub mod primitives;
pub mod resolver;
pub mod route;
pub mod source;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AccessFault, AjaxMode, HideType, Node, NodeId, NodeRow, NodeType, RequestContext, RoleId,
    SiteError,
};

// =============================================================================
// RE-EXPORTS: Routing
// =============================================================================

pub use alias::AliasIndex;
pub use builder::{GraphBuilder, assemble, decode_entities};
pub use chaser::LinkChaser;
pub use config::SiteConfig;
pub use graph::{NodeGraph, node_url};
pub use menu::{MenuBuilder, MenuItem};
pub use resolver::{Resolution, Resolver};
pub use route::{RouteDescriptor, RouteMatch, RouteParams, RouteTable};

// =============================================================================
// RE-EXPORTS: Dispatch
// =============================================================================

pub use collaborators::{
    CronLedger, FileLoader, MemoryCronLedger, MemoryFiles, TracingTransactions, TransactionId,
    TransactionManager,
};
pub use dispatch::{
    Action, Controller, ControllerFactory, ControllerRegistry, DispatchContext, Dispatcher,
    Trigger, controller_paths,
};

// =============================================================================
// RE-EXPORTS: Persistence (from formats, cache and storage modules)
// =============================================================================

pub use cache::{GraphCache, MemoryCache};
pub use formats::{SnapshotHeader, graph_from_bytes, graph_to_bytes, snapshot_fingerprint};
pub use source::{MemoryNodeSource, NodeSource};
pub use storage::{RedbCache, RedbSiteStore};
