//! SPARQL endpoint access for geolimes.
//!
//! - [`SelectQuery`]: builds paged `SELECT` queries from a [`Selection`] and
//!   derives the selection's [`Fingerprint`](geolimes_core::Fingerprint)
//! - [`HttpQuerySource`]: a [`RemoteQuerySource`](geolimes_cache::RemoteQuerySource)
//!   that pages through an endpoint over HTTP

pub mod error;
mod http;
mod query;
mod results;

pub use error::{Result, SparqlError};
pub use http::{HttpQuerySource, MAX_ROWS_HEADER};
pub use query::{Prefix, SelectQuery, Selection};
pub use results::{decode_rows, SPARQL_RESULTS_JSON};
