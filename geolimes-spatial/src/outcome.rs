//! Match results, per-record errors and run statistics.

use crate::predicate::Relation;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A relation that holds between one source and one target record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub source_id: String,
    pub relation: Relation,
    pub target_id: String,

    /// Computed distance, present for metric relations only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Class of a non-fatal matching failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchErrorKind {
    /// A record's geometry failed to parse or is structurally invalid.
    InvalidGeometry,
    /// The geometry library failed on a nominally valid pair.
    PredicateEvaluation,
}

/// A per-record failure. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchError {
    /// Id of the record the failure is attributed to.
    pub subject_id: String,
    pub kind: MatchErrorKind,
    pub reason: String,
}

impl MatchError {
    pub fn invalid_geometry(subject_id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            subject_id: subject_id.into(),
            kind: MatchErrorKind::InvalidGeometry,
            reason: reason.to_string(),
        }
    }

    pub fn predicate_evaluation(source_id: &str, target_id: &str, reason: impl fmt::Display) -> Self {
        Self {
            subject_id: format!("{source_id} / {target_id}"),
            kind: MatchErrorKind::PredicateEvaluation,
            reason: reason.to_string(),
        }
    }

    /// Literal message; errors with the same message are reported once.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MatchErrorKind::InvalidGeometry => {
                write!(f, "Geometry not valid: {} ({})", self.subject_id, self.reason)
            }
            MatchErrorKind::PredicateEvaluation => {
                write!(f, "Predicate evaluation failed: {} ({})", self.subject_id, self.reason)
            }
        }
    }
}

/// Drop errors whose message was already seen, keeping first-seen order.
pub fn dedup_errors(errors: impl IntoIterator<Item = MatchError>) -> Vec<MatchError> {
    let mut seen = FxHashSet::default();
    errors
        .into_iter()
        .filter(|e| seen.insert(e.message()))
        .collect()
}

/// Counters collected while matching.
///
/// Use these to judge how much work the bbox prefilter saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    /// Source records processed.
    pub source_records: usize,

    /// Source records rejected before candidate lookup.
    pub invalid_sources: usize,

    /// Candidates returned by the index (or the full target set).
    pub candidates: usize,

    /// Pairs on which predicates were evaluated.
    pub exact_checks: usize,

    /// Chunks dispatched to the pool.
    pub chunks: usize,
}

impl MatchStats {
    pub fn merge(&mut self, other: &MatchStats) {
        self.source_records += other.source_records;
        self.invalid_sources += other.invalid_sources;
        self.candidates += other.candidates;
        self.exact_checks += other.exact_checks;
        self.chunks += other.chunks;
    }

    /// exact_checks / candidates. Lower means more candidates were skipped.
    pub fn check_ratio(&self) -> f64 {
        if self.candidates == 0 {
            0.0
        } else {
            self.exact_checks as f64 / self.candidates as f64
        }
    }
}

/// Everything a matching run produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub results: Vec<MatchResult>,
    pub errors: Vec<MatchError>,
    #[serde(skip)]
    pub stats: MatchStats,
}
