//! Incremental, gap-aware cache for paginated remote datasets.
//!
//! A [`Cache`] sits between a [`RemoteQuerySource`] and a [`CacheStore`] for
//! one [`Fingerprint`](geolimes_core::Fingerprint). Asking it to materialise a
//! window fetches only the offsets that are not already persisted, adapting
//! its page size to server limits and stopping at the end of the stream.
//!
//! # Modules
//!
//! - [`store`]: the store trait and its file and SQLite backends
//! - [`source`]: the remote source trait and page types
//! - [`retry`]: bounded exponential backoff for transient failures
//! - [`error`]: error types

mod cache;
mod encoding;
pub mod error;
mod range_index;
pub mod retry;
pub mod source;
pub mod store;

pub use cache::{Cache, Dataset, FetchStats, DEFAULT_CHUNKSIZE};
pub use encoding::decode_body;
pub use error::{CacheError, Result};
pub use range_index::{FetchPlan, MissingInterval, RangeIndex};
pub use retry::RetryPolicy;
pub use source::{ContentEncoding, FetchResult, RemoteQuerySource, ServerHints, SourceRow};
pub use store::{CacheStore, FileStore, SqliteStore, StoreKind};
