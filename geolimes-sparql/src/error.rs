//! Error types for query construction and result decoding.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SparqlError {
    /// A selection without a raw query lacks a required part.
    #[error("Incomplete selection: missing {0}")]
    MissingField(&'static str),

    /// Variable name is empty or contains characters SPARQL does not allow.
    #[error("Invalid variable name: {0:?}")]
    InvalidVariable(String),

    /// Results document could not be parsed.
    #[error("Invalid SPARQL results: {0}")]
    Results(String),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, SparqlError>;
