//! Materialised-range bookkeeping and fetch planning.

use crate::error::Result;
use crate::store::CacheStore;
use geolimes_core::{IntervalSet, OffsetRange, OffsetWindow};
use std::fmt;

/// A range of offsets that has to be fetched: `[lo, hi]`, or `[lo, ∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingInterval {
    pub lo: u64,
    pub hi: Option<u64>,
}

impl MissingInterval {
    pub fn bounded(range: OffsetRange) -> Self {
        Self {
            lo: range.lo,
            hi: Some(range.hi),
        }
    }

    pub fn open(lo: u64) -> Self {
        Self { lo, hi: None }
    }
}

impl fmt::Display for MissingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hi {
            Some(hi) => write!(f, "[{}, {}]", self.lo, hi),
            None => write!(f, "[{}, ..)", self.lo),
        }
    }
}

/// What `materialize` has to do for a window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// Disjoint, ascending, never overlapping materialised offsets.
    pub missing: Vec<MissingInterval>,

    /// For open windows that start at or below the materialised maximum: the
    /// offset to probe with a 1-row fetch to learn whether the stream grew.
    pub probe_at: Option<u64>,
}

impl FetchPlan {
    pub fn is_noop(&self) -> bool {
        self.missing.is_empty() && self.probe_at.is_none()
    }
}

/// Which offsets of one fingerprint are persisted, and where the remote
/// stream was last seen to end.
///
/// Always rebuilt from the store on open; updated in memory as chunks land.
#[derive(Debug, Clone, Default)]
pub struct RangeIndex {
    ranges: IntervalSet,
    end_offset: Option<u64>,
}

impl RangeIndex {
    pub fn load(store: &dyn CacheStore) -> Result<Self> {
        Ok(Self {
            ranges: store.materialized()?,
            end_offset: store.end_offset()?,
        })
    }

    pub fn ranges(&self) -> &IntervalSet {
        &self.ranges
    }

    pub fn max_offset(&self) -> Option<u64> {
        self.ranges.max()
    }

    /// First offset known not to exist remotely.
    pub fn end_offset(&self) -> Option<u64> {
        self.end_offset
    }

    /// Record a freshly persisted range.
    pub fn record(&mut self, range: OffsetRange) {
        self.ranges.union(range);
    }

    pub fn set_end_offset(&mut self, end: Option<u64>) {
        self.end_offset = end;
    }

    /// Plan the fetches needed to cover `window`.
    ///
    /// Bounded windows are clipped at the known end of stream. Open windows
    /// always probe past the maximum, since only they can see the stream grow.
    pub fn plan(&self, window: OffsetWindow) -> FetchPlan {
        match (window.end, self.ranges.max()) {
            (Some(end), _) => FetchPlan {
                missing: self
                    .ranges
                    .subtract(OffsetRange {
                        lo: window.start,
                        hi: end.max(window.start),
                    })
                    .into_iter()
                    .filter_map(|gap| self.clip(gap))
                    .map(MissingInterval::bounded)
                    .collect(),
                probe_at: None,
            },
            // Nothing known at or beyond the start: fetch until end of stream.
            (None, None) => FetchPlan {
                missing: vec![MissingInterval::open(window.start)],
                probe_at: None,
            },
            (None, Some(max)) if window.start > max => FetchPlan {
                missing: vec![MissingInterval::open(window.start)],
                probe_at: None,
            },
            (None, Some(max)) => FetchPlan {
                missing: self
                    .ranges
                    .subtract(OffsetRange {
                        lo: window.start,
                        hi: max,
                    })
                    .into_iter()
                    .map(MissingInterval::bounded)
                    .collect(),
                probe_at: max.checked_add(1),
            },
        }
    }

    /// The part of `gap` below the known end of stream.
    fn clip(&self, gap: OffsetRange) -> Option<OffsetRange> {
        match self.end_offset {
            None => Some(gap),
            Some(end) if gap.lo >= end => None,
            Some(end) => Some(OffsetRange {
                lo: gap.lo,
                hi: gap.hi.min(end - 1),
            }),
        }
    }
}
