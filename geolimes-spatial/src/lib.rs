//! Bounding-box indexing and parallel predicate matching for geolimes.
//!
//! Given a materialised target dataset, this crate builds an immutable
//! [`TargetSnapshot`] (parsed geometries plus an R-tree over their boxes) and
//! matches a source dataset against it on a bounded worker pool.
//!
//! # Architecture
//!
//! ```text
//!   target records                          source records
//!         │                                        │
//!         ▼                                        ▼
//!   parse + validate (parallel)            par_chunks(chunk_size)
//!         │                                        │
//!         ▼                                        ▼
//!   ┌──────────────────────┐   query(region)  ┌──────────────┐
//!   │    TargetSnapshot    │ ◄─────────────── │ worker chunk │  × N workers
//!   │  buffer │ R-tree     │ ───────────────► │              │
//!   └──────────────────────┘   sequence ids   └──────────────┘
//!                                                  │
//!                                                  ▼
//!                                    exact predicates (DE-9IM / metric)
//!                                                  │
//!                                                  ▼
//!                                    merge + dedup errors → MatchOutcome
//! ```
//!
//! Metric relations and `disjoint` cannot be pruned by box intersection, so a
//! predicate set containing any of them compares each source against every
//! indexed target.
//!
//! # Modules
//!
//! - [`config`]: engine configuration
//! - [`geometry`]: WKT parsing, validity and bounding boxes
//! - [`index`]: R-tree over target boxes
//! - [`predicate`]: relation vocabulary and evaluation
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod geometry;
pub mod index;
mod matcher;
mod outcome;
pub mod predicate;
mod snapshot;

pub use config::{MatchConfig, DEFAULT_CHUNK_SIZE, MIN_WORKERS};
pub use error::{Result, SpatialError};
pub use geometry::{parse_valid, parse_wkt, BBox, ParsedGeometry};
pub use index::SpatialIndex;
pub use matcher::MatchingEngine;
pub use outcome::{dedup_errors, MatchError, MatchErrorKind, MatchOutcome, MatchResult, MatchStats};
pub use predicate::{Hit, PredicateSet, Relation};
pub use snapshot::{TargetEntry, TargetSnapshot, TargetState};
