//! Dataset rows.

use serde::{Deserialize, Serialize};

/// A single materialised row.
///
/// `server_offset` is the position assigned by the remote source's enumeration
/// order. It is unique within a fingerprint's cache and is the only ordering
/// and identity key used for gap reconciliation; `entity_id` may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub entity_id: String,

    /// Geometry as WKT text. Parsing is deferred to the matching stage so a
    /// malformed value never blocks caching.
    pub geometry: String,

    pub server_offset: u64,
}

impl Record {
    pub fn new(entity_id: impl Into<String>, geometry: impl Into<String>, server_offset: u64) -> Self {
        Self {
            entity_id: entity_id.into(),
            geometry: geometry.into(),
            server_offset,
        }
    }
}
