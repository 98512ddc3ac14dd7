//! Error types for spatial indexing and matching.

use thiserror::Error;

/// Spatial errors.
///
/// Per-record geometry problems are not errors at this level: the matching
/// engine reports them as [`MatchError`](crate::MatchError) values and keeps
/// going. These variants cover parsing helpers and engine setup.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// WKT parsing error.
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// Invalid geometry (e.g., self-intersecting polygon ring).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Unknown relation name.
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Result type for spatial operations.
pub type Result<T> = std::result::Result<T, SpatialError>;
