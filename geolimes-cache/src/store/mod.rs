//! Persistent per-fingerprint record stores.
//!
//! A store holds the rows materialised for one [`Fingerprint`], keyed by
//! server offset, plus the end-of-stream offset once a short read has shown
//! one. Stores are append-only: an offset, once written, is never rewritten.
//! The set of materialised ranges is always recomputed from the store
//! contents, so a crash mid-fetch leaves a consistent (if partial) cache
//! behind.

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use geolimes_core::{Fingerprint, IntervalSet, OffsetRange, OffsetWindow, Record};
use geolimes_spatial::{parse_wkt, BBox};
use std::path::PathBuf;

/// The operations every backend supports, plus helpers derived from them.
pub trait CacheStore: Send {
    fn fingerprint(&self) -> &Fingerprint;

    /// Persist rows. Offsets already present are left untouched.
    fn insert_range(&mut self, records: &[Record]) -> Result<()>;

    /// Rows whose offset falls in `window`, ascending by offset.
    fn scan_range(&self, window: OffsetWindow) -> Result<Vec<Record>>;

    /// Smallest and largest persisted offsets.
    fn min_max_offset(&self) -> Result<Option<(u64, u64)>>;

    /// All persisted offsets, ascending.
    fn offsets(&self) -> Result<Vec<u64>>;

    /// First offset known not to exist remotely, if a short read found one.
    fn end_offset(&self) -> Result<Option<u64>>;

    /// Persist (or clear, with `None`) the end-of-stream offset.
    fn set_end_offset(&mut self, end: Option<u64>) -> Result<()>;

    /// Rows whose geometry bounding box intersects `region`, ascending by
    /// offset. Rows that do not parse, or are empty, never match.
    fn scan_bbox(&self, region: &BBox) -> Result<Vec<Record>> {
        let rows = self.scan_range(OffsetWindow::unbounded(0))?;
        Ok(rows
            .into_iter()
            .filter(|r| derive_bbox(&r.geometry).is_some_and(|b| b.intersects(region)))
            .collect())
    }

    /// Materialised ranges, recomputed from the persisted offsets.
    fn materialized(&self) -> Result<IntervalSet> {
        Ok(IntervalSet::from_offsets(self.offsets()?))
    }

    /// Sub-ranges of `range` with no persisted rows.
    fn find_gaps(&self, range: OffsetRange) -> Result<Vec<OffsetRange>> {
        Ok(self.materialized()?.subtract(range))
    }
}

/// Bounding box of a WKT literal, `None` when it does not parse or is empty.
pub(crate) fn derive_bbox(wkt: &str) -> Option<BBox> {
    parse_wkt(wkt)
        .ok()
        .and_then(|g| BBox::from_geometry(&g))
        .filter(BBox::is_finite)
}

/// Which backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// One delimited text file per fingerprint under this directory.
    File { dir: PathBuf },
    /// One table per fingerprint in this SQLite database file.
    Sqlite { path: PathBuf },
}

impl StoreKind {
    /// Open (or create) the store for `fingerprint`.
    pub fn open(&self, fingerprint: &Fingerprint) -> Result<Box<dyn CacheStore>> {
        Ok(match self {
            StoreKind::File { dir } => Box::new(FileStore::open(dir, fingerprint.clone())?),
            StoreKind::Sqlite { path } => Box::new(SqliteStore::open(path, fingerprint.clone())?),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::File { .. } => "file",
            StoreKind::Sqlite { .. } => "sqlite",
        }
    }
}
