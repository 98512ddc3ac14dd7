//! Offset intervals.
//!
//! [`IntervalSet`] is a sorted set of disjoint, non-adjacent inclusive ranges
//! over `u64` offsets. The cache uses it to describe which offsets of a
//! fingerprint are already persisted and to compute the gaps of a requested
//! window, so it never requests the same offset twice.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range `[lo, hi]` of server offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OffsetRange {
    pub lo: u64,
    pub hi: u64,
}

impl OffsetRange {
    pub fn new(lo: u64, hi: u64) -> Result<Self> {
        if lo > hi {
            return Err(CoreError::InvalidRange { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    /// Single-offset range.
    pub fn point(offset: u64) -> Self {
        Self {
            lo: offset,
            hi: offset,
        }
    }

    /// Number of offsets covered.
    pub fn len(&self) -> u64 {
        self.hi - self.lo + 1
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.lo && offset <= self.hi
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

/// A requested window of offsets: `[start, end]`, or `[start, ∞)` when
/// `end` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetWindow {
    pub start: u64,
    pub end: Option<u64>,
}

impl OffsetWindow {
    /// Window from an offset and a signed limit. `limit <= 0` is unbounded.
    pub fn from_offset_limit(offset: u64, limit: i64) -> Self {
        let end = if limit > 0 {
            Some(offset.saturating_add(limit as u64 - 1))
        } else {
            None
        };
        Self { start: offset, end }
    }

    pub fn bounded(start: u64, end: u64) -> Result<Self> {
        OffsetRange::new(start, end)?;
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    pub fn unbounded(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn is_bounded(&self) -> bool {
        self.end.is_some()
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && self.end.is_none_or(|end| offset <= end)
    }

    /// Bounded part of the window, clipped at `max` for open windows.
    /// `None` when the window starts beyond `max`.
    pub fn clip(&self, max: u64) -> Option<OffsetRange> {
        let hi = self.end.map_or(max, |end| end.min(max));
        OffsetRange::new(self.start, hi).ok()
    }
}

impl fmt::Display for OffsetWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, ..)", self.start),
        }
    }
}

/// Sorted set of disjoint inclusive offset ranges.
///
/// Adjacent ranges are merged on insert, so the representation is minimal
/// and two sets covering the same offsets compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSet {
    ranges: Vec<OffsetRange>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary offsets (any order, duplicates allowed).
    pub fn from_offsets(offsets: impl IntoIterator<Item = u64>) -> Self {
        let mut sorted: Vec<u64> = offsets.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges: Vec<OffsetRange> = Vec::new();
        for offset in sorted {
            match ranges.last_mut() {
                Some(last) if last.hi.checked_add(1) == Some(offset) => last.hi = offset,
                _ => ranges.push(OffsetRange::point(offset)),
            }
        }
        Self { ranges }
    }

    pub fn ranges(&self) -> &[OffsetRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of offsets covered.
    pub fn offset_count(&self) -> u64 {
        self.ranges.iter().map(OffsetRange::len).sum()
    }

    pub fn min(&self) -> Option<u64> {
        self.ranges.first().map(|r| r.lo)
    }

    pub fn max(&self) -> Option<u64> {
        self.ranges.last().map(|r| r.hi)
    }

    pub fn contains(&self, offset: u64) -> bool {
        let idx = self.ranges.partition_point(|r| r.hi < offset);
        self.ranges.get(idx).is_some_and(|r| r.lo <= offset)
    }

    /// True when every offset of `range` is in the set.
    pub fn covers(&self, range: OffsetRange) -> bool {
        let idx = self.ranges.partition_point(|r| r.hi < range.lo);
        self.ranges
            .get(idx)
            .is_some_and(|r| r.lo <= range.lo && r.hi >= range.hi)
    }

    /// Add a range, merging with overlapping or adjacent ranges.
    pub fn union(&mut self, range: OffsetRange) {
        // First range that could touch `range` (its hi + 1 >= range.lo).
        let start = self
            .ranges
            .partition_point(|r| r.hi.saturating_add(1) < range.lo);
        let mut merged = range;
        let mut end = start;
        while end < self.ranges.len() && self.ranges[end].lo <= merged.hi.saturating_add(1) {
            merged.lo = merged.lo.min(self.ranges[end].lo);
            merged.hi = merged.hi.max(self.ranges[end].hi);
            end += 1;
        }
        self.ranges.splice(start..end, std::iter::once(merged));
    }

    /// Add every range of `other`.
    pub fn union_all(&mut self, other: &IntervalSet) {
        for range in &other.ranges {
            self.union(*range);
        }
    }

    /// The parts of `range` not covered by the set, ascending and disjoint.
    pub fn subtract(&self, range: OffsetRange) -> Vec<OffsetRange> {
        let mut gaps = Vec::new();
        let mut cursor = range.lo;
        let start = self.ranges.partition_point(|r| r.hi < range.lo);

        for covered in &self.ranges[start..] {
            if covered.lo > range.hi {
                break;
            }
            if covered.lo > cursor {
                gaps.push(OffsetRange {
                    lo: cursor,
                    hi: covered.lo - 1,
                });
            }
            match covered.hi.checked_add(1) {
                Some(next) => cursor = cursor.max(next),
                None => return gaps,
            }
            if cursor > range.hi {
                return gaps;
            }
        }

        if cursor <= range.hi {
            gaps.push(OffsetRange {
                lo: cursor,
                hi: range.hi,
            });
        }
        gaps
    }
}

impl FromIterator<OffsetRange> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = OffsetRange>>(iter: I) -> Self {
        let mut set = IntervalSet::new();
        for range in iter {
            set.union(range);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(lo: u64, hi: u64) -> OffsetRange {
        OffsetRange::new(lo, hi).unwrap()
    }

    #[test]
    fn test_from_offsets_groups_contiguous_runs() {
        let set = IntervalSet::from_offsets([5, 1, 2, 3, 7, 6, 10, 2]);
        assert_eq!(set.ranges(), &[r(1, 3), r(5, 7), r(10, 10)]);
        assert_eq!(set.offset_count(), 7);
        assert_eq!(set.min(), Some(1));
        assert_eq!(set.max(), Some(10));
    }

    #[test]
    fn test_union_merges_overlap_and_adjacency() {
        let mut set = IntervalSet::new();
        set.union(r(10, 19));
        set.union(r(30, 39));
        set.union(r(20, 29));
        assert_eq!(set.ranges(), &[r(10, 39)]);

        set.union(r(50, 60));
        set.union(r(0, 5));
        set.union(r(55, 70));
        assert_eq!(set.ranges(), &[r(0, 5), r(10, 39), r(50, 70)]);

        set.union(r(3, 52));
        assert_eq!(set.ranges(), &[r(0, 70)]);
    }

    #[test]
    fn test_subtract_gap_closure() {
        let set = IntervalSet::from_iter([r(0, 999)]);
        assert_eq!(set.subtract(r(500, 1499)), vec![r(1000, 1499)]);
        assert!(set.subtract(r(0, 999)).is_empty());
        assert!(set.subtract(r(200, 300)).is_empty());
    }

    #[test]
    fn test_subtract_multiple_holes() {
        let set = IntervalSet::from_iter([r(10, 19), r(30, 39), r(60, 60)]);
        assert_eq!(
            set.subtract(r(0, 100)),
            vec![r(0, 9), r(20, 29), r(40, 59), r(61, 100)]
        );
        assert_eq!(set.subtract(r(15, 35)), vec![r(20, 29)]);
        assert_eq!(set.subtract(r(40, 45)), vec![r(40, 45)]);
    }

    #[test]
    fn test_subtract_on_empty_set() {
        let set = IntervalSet::new();
        assert_eq!(set.subtract(r(3, 9)), vec![r(3, 9)]);
    }

    #[test]
    fn test_subtract_gaps_plus_set_cover_request() {
        let set = IntervalSet::from_iter([r(5, 8), r(12, 12), r(20, 40)]);
        let request = r(0, 30);
        let mut combined = set.clone();
        for gap in set.subtract(request) {
            assert!(!set.contains(gap.lo) && !set.contains(gap.hi));
            combined.union(gap);
        }
        assert!(combined.covers(request));
    }

    #[test]
    fn test_subtract_at_u64_max() {
        let set = IntervalSet::from_iter([r(u64::MAX - 1, u64::MAX)]);
        assert_eq!(set.subtract(r(u64::MAX - 5, u64::MAX)), vec![r(u64::MAX - 5, u64::MAX - 2)]);
    }

    #[test]
    fn test_contains_and_covers() {
        let set = IntervalSet::from_iter([r(0, 9), r(20, 29)]);
        assert!(set.contains(0) && set.contains(25));
        assert!(!set.contains(10) && !set.contains(30));
        assert!(set.covers(r(2, 8)));
        assert!(!set.covers(r(5, 25)));
    }

    #[test]
    fn test_window_from_offset_limit() {
        assert_eq!(
            OffsetWindow::from_offset_limit(500, 1000),
            OffsetWindow { start: 500, end: Some(1499) }
        );
        assert_eq!(OffsetWindow::from_offset_limit(0, 0), OffsetWindow::unbounded(0));
        assert_eq!(OffsetWindow::from_offset_limit(7, -1), OffsetWindow::unbounded(7));
    }

    #[test]
    fn test_window_clip() {
        let open = OffsetWindow::unbounded(10);
        assert_eq!(open.clip(99), Some(r(10, 99)));
        assert_eq!(open.clip(5), None);
        let closed = OffsetWindow::bounded(10, 20).unwrap();
        assert_eq!(closed.clip(99), Some(r(10, 20)));
        assert_eq!(closed.clip(15), Some(r(10, 15)));
    }
}
