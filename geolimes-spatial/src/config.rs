//! Matching engine configuration.

use crate::error::{Result, SpatialError};
use serde::{Deserialize, Serialize};

/// Default number of source records per work unit.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Smallest pool size used when the worker count is auto-detected.
pub const MIN_WORKERS: usize = 2;

/// Configuration for a [`MatchingEngine`](crate::MatchingEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Source records per chunk. Chunk boundaries depend only on record
    /// position, never on geometry content.
    pub chunk_size: usize,

    /// Explicit worker count. `None` sizes the pool to the available CPU
    /// parallelism, with a floor of [`MIN_WORKERS`].
    pub workers: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: None,
        }
    }
}

impl MatchConfig {
    /// Set the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set an explicit worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SpatialError::Config("chunk_size must be > 0".into()));
        }
        if self.workers == Some(0) {
            return Err(SpatialError::Config("workers must be > 0".into()));
        }
        Ok(())
    }

    /// Worker count the pool will be built with.
    pub fn resolved_workers(&self) -> usize {
        match self.workers {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_WORKERS)
                .max(MIN_WORKERS),
        }
    }
}
