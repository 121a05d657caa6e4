//! # Snapshot Format
//!
//! Binary serialization of `NodeGraph` snapshots for the cache.
//!
//! Format: Header (5 bytes) + postcard-serialized graph.
//! - 4 bytes: Magic ("SGRF")
//! - 1 byte: Version
//!
//! Decoding validates size and header before touching the payload. Any
//! failure is reported as `SiteError::SerializationError`; the builder
//! turns that into a cache miss.

use crate::{NodeGraph, SiteError, primitives};

/// Maximum accepted snapshot size (64 MB).
///
/// Checked before deserialization so a corrupt cache entry cannot drive
/// a large allocation.
pub const MAX_SNAPSHOT_SIZE: usize = 64 * 1024 * 1024;

/// Header length in bytes.
const HEADER_LEN: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header that precedes every snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), SiteError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(SiteError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(SiteError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SiteError> {
        let Some(head) = bytes.get(..HEADER_LEN) else {
            return Err(SiteError::SerializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[0..4]);
        Ok(Self {
            magic,
            version: head[4],
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Serialize a graph (header + payload).
pub fn graph_to_bytes(graph: &NodeGraph) -> Result<Vec<u8>, SiteError> {
    let payload =
        postcard::to_stdvec(graph).map_err(|e| SiteError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(&SnapshotHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a graph.
pub fn graph_from_bytes(bytes: &[u8]) -> Result<NodeGraph, SiteError> {
    if bytes.len() > MAX_SNAPSHOT_SIZE {
        return Err(SiteError::SerializationError(format!(
            "Snapshot size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        SiteError::SerializationError(format!("Failed to deserialize graph snapshot: {}", e))
    })
}

/// Fingerprint of an encoded snapshot.
///
/// BLAKE3 hex digest with the `crypto-hash` feature, otherwise an FNV-1a
/// 64-bit digest in hex.
#[must_use]
pub fn snapshot_fingerprint(bytes: &[u8]) -> String {
    #[cfg(feature = "crypto-hash")]
    {
        blake3::hash(bytes).to_hex().to_string()
    }
    #[cfg(not(feature = "crypto-hash"))]
    {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        format!("{:016x}", hash)
    }
}

// =============================================================================
// TESTS
// =============================================================================
