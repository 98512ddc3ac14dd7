//! Error types for cache operations.

use geolimes_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Cache errors. Every variant is fatal to the current `materialize` call;
/// rows persisted before the failure stay valid.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Endpoint unreachable, refused the request, or answered with an error
    /// status. `transient` failures are eligible for retry.
    #[error("Remote fetch failed at offset {offset}: {message}")]
    RemoteFetch {
        offset: u64,
        message: String,
        transient: bool,
    },

    /// Response body could not be decompressed or decoded into rows.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Writing to or reading from the cache store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CacheError {
    pub fn remote(offset: u64, message: impl Into<String>, transient: bool) -> Self {
        CacheError::RemoteFetch {
            offset,
            message: message.into(),
            transient,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::RemoteFetch { transient: true, .. })
    }

    /// Store failures (file or SQLite).
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            CacheError::Persistence(_) | CacheError::Io { .. } | CacheError::Sqlite(_)
        )
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
