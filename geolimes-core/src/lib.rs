//! Core types shared by every geolimes crate.
//!
//! - [`Record`]: one `(entity id, WKT geometry, server offset)` row of a dataset
//! - [`Fingerprint`]: deterministic identity of a dataset selection, used as the
//!   cache namespace
//! - [`OffsetWindow`] / [`OffsetRange`] / [`IntervalSet`]: offset bookkeeping
//!   used to reconcile paginated fetches with what is already materialised

pub mod error;
pub mod fingerprint;
pub mod interval;
pub mod record;

pub use error::{CoreError, Result};
pub use fingerprint::{canonicalize_query, Fingerprint};
pub use interval::{IntervalSet, OffsetRange, OffsetWindow};
pub use record::Record;
