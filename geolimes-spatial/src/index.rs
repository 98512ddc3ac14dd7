//! Bounding-box R-tree over a target snapshot.
//!
//! Entries are `(sequence_id, bbox)` pairs; the sequence id is the record's
//! position in the [`TargetSnapshot`](crate::TargetSnapshot) buffer. Queries
//! return every entry whose box intersects the query region, which is a
//! superset of the true predicate matches: callers re-check exactly.

use crate::geometry::BBox;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use std::fmt;

/// R-tree leaf: a rectangle tagged with its sequence id.
pub type IndexEntry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Immutable spatial index, safe to query from many threads.
pub struct SpatialIndex {
    tree: RTree<IndexEntry>,
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("entries", &self.tree.size())
            .finish()
    }
}

impl SpatialIndex {
    /// Bulk-load from `(sequence_id, bbox)` pairs. Boxes with non-finite bounds
    /// are skipped.
    pub fn build(entries: impl IntoIterator<Item = (usize, BBox)>) -> Self {
        let leaves: Vec<IndexEntry> = entries
            .into_iter()
            .filter(|(_, bbox)| bbox.is_finite())
            .map(|(seq, bbox)| {
                GeomWithData::new(
                    Rectangle::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y]),
                    seq,
                )
            })
            .collect();
        Self {
            tree: RTree::bulk_load(leaves),
        }
    }

    /// Sequence ids whose box intersects `region`.
    pub fn query<'a>(&'a self, region: &BBox) -> impl Iterator<Item = usize> + 'a {
        self.tree
            .locate_in_envelope_intersecting(&region.envelope())
            .map(|entry| entry.data)
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
