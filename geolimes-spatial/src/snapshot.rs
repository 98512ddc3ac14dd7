//! Immutable target snapshot: parsed target geometries plus their index.
//!
//! Built once per matching run, before any worker starts, and then shared by
//! reference. Nothing in it is mutated after [`TargetSnapshot::build`].

use crate::geometry::{parse_wkt, validate, BBox, ParsedGeometry};
use crate::index::SpatialIndex;
use crate::outcome::MatchError;
use geolimes_core::Record;
use rayon::prelude::*;

/// Parse state of one target record.
#[derive(Debug)]
pub enum TargetState {
    Valid(ParsedGeometry),

    /// Parsed, but structurally invalid. Still indexed by its box so the
    /// failure is reported when a source record reaches it.
    Invalid { bbox: Option<BBox>, reason: String },

    /// WKT did not parse. Never indexed.
    Unparsable { reason: String },
}

/// A target record and its parse state, addressed by sequence id.
#[derive(Debug)]
pub struct TargetEntry {
    pub record: Record,
    pub state: TargetState,
}

impl TargetEntry {
    fn bbox(&self) -> Option<BBox> {
        match &self.state {
            TargetState::Valid(parsed) => parsed.bbox,
            TargetState::Invalid { bbox, .. } => *bbox,
            TargetState::Unparsable { .. } => None,
        }
    }
}

/// Read-only target buffer and bounding-box index.
#[derive(Debug)]
pub struct TargetSnapshot {
    entries: Vec<TargetEntry>,
    index: SpatialIndex,

    /// Sequence ids that carry a finite bbox, ascending. Full scans iterate
    /// this list, so empty and unparsable targets are skipped there too.
    indexed: Vec<usize>,

    build_errors: Vec<MatchError>,
}

impl TargetSnapshot {
    /// Parse every record in parallel on the current rayon pool and bulk-load
    /// the index. The sequence id of a record is its position in `records`.
    pub fn build(records: Vec<Record>) -> Self {
        let entries: Vec<TargetEntry> = records
            .into_par_iter()
            .map(|record| {
                let state = classify(&record.geometry);
                TargetEntry { record, state }
            })
            .collect();

        let boxed: Vec<(usize, BBox)> = entries
            .iter()
            .enumerate()
            .filter_map(|(seq, entry)| entry.bbox().filter(BBox::is_finite).map(|b| (seq, b)))
            .collect();
        let indexed = boxed.iter().map(|(seq, _)| *seq).collect();
        let index = SpatialIndex::build(boxed);

        let build_errors = entries
            .iter()
            .filter_map(|entry| match &entry.state {
                TargetState::Unparsable { reason } => {
                    Some(MatchError::invalid_geometry(&entry.record.entity_id, reason))
                }
                _ => None,
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            targets = entries.len(),
            indexed = index.len(),
            unparsable = build_errors.len(),
            "target snapshot built"
        );

        Self {
            entries,
            index,
            indexed,
            build_errors,
        }
    }

    pub fn get(&self, seq: usize) -> Option<&TargetEntry> {
        self.entries.get(seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn indexed(&self) -> &[usize] {
        &self.indexed
    }

    /// Errors for targets whose WKT could not be parsed at all.
    pub fn build_errors(&self) -> &[MatchError] {
        &self.build_errors
    }
}

fn classify(wkt: &str) -> TargetState {
    let geometry = match parse_wkt(wkt) {
        Ok(g) => g,
        Err(e) => {
            return TargetState::Unparsable {
                reason: e.to_string(),
            }
        }
    };
    match validate(&geometry) {
        Ok(()) => TargetState::Valid(ParsedGeometry::new(geometry)),
        Err(e) => TargetState::Invalid {
            bbox: BBox::from_geometry(&geometry),
            reason: e.to_string(),
        },
    }
}
