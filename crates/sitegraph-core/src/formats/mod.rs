//! # Formats
//!
//! Byte-level encodings owned by the core. File and cache I/O live with
//! the collaborators.

pub mod persistence;

pub use persistence::{
    MAX_SNAPSHOT_SIZE, SnapshotHeader, graph_from_bytes, graph_to_bytes, snapshot_fingerprint,
};
