//! Relational backend: one SQLite table per fingerprint.
//!
//! Table `fp_<fingerprint>` holds `(uri, shape, server_offset)`. Bounding
//! boxes derived from the WKT at insert time go into the R*Tree virtual table
//! `fp_<fingerprint>_rtree`, keyed by server offset; geometries that do not
//! parse or are empty get no entry. The shared `geolimes_stream_end` table
//! holds the end-of-stream offset of every fingerprint that has one.

use super::{derive_bbox, CacheStore};
use crate::error::{CacheError, Result};
use geolimes_core::{Fingerprint, IntervalSet, OffsetRange, OffsetWindow, Record};
use geolimes_spatial::BBox;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    fingerprint: Fingerprint,
    conn: Connection,
    table: String,
    rtree: String,
}

impl SqliteStore {
    /// Open the database at `path` and create the fingerprint's table if it
    /// does not exist yet.
    pub fn open(path: &Path, fingerprint: Fingerprint) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, fingerprint)
    }

    /// In-memory database, mostly useful in tests.
    pub fn open_in_memory(fingerprint: Fingerprint) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, fingerprint)
    }

    fn with_connection(conn: Connection, fingerprint: Fingerprint) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        // The fingerprint is lowercase hex, safe to splice into identifiers.
        let table = format!("fp_{fingerprint}");
        let rtree = format!("{table}_rtree");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                uri TEXT NOT NULL,
                shape TEXT NOT NULL,
                server_offset INTEGER PRIMARY KEY
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS {rtree} USING rtree(id, min_x, max_x, min_y, max_y);
            CREATE TABLE IF NOT EXISTS geolimes_stream_end (
                fingerprint TEXT PRIMARY KEY,
                end_offset INTEGER NOT NULL
            );"
        ))?;

        Ok(Self {
            fingerprint,
            conn,
            table,
            rtree,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rtree(&self) -> &str {
        &self.rtree
    }
}

impl CacheStore for SqliteStore {
    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    fn insert_range(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let insert_row = format!(
            "INSERT OR IGNORE INTO {} (uri, shape, server_offset) VALUES (?1, ?2, ?3)",
            self.table
        );
        let insert_box = format!(
            "INSERT INTO {} (id, min_x, max_x, min_y, max_y) VALUES (?1, ?2, ?3, ?4, ?5)",
            self.rtree
        );

        let tx = self.conn.transaction()?;
        {
            let mut rows = tx.prepare_cached(&insert_row)?;
            let mut boxes = tx.prepare_cached(&insert_box)?;
            for record in records {
                let offset = to_sql_offset(record.server_offset)?;
                let inserted = rows.execute(params![record.entity_id, record.geometry, offset])?;
                if inserted == 0 {
                    continue;
                }
                if let Some(b) = derive_bbox(&record.geometry) {
                    boxes.execute(params![offset, b.min_x, b.max_x, b.min_y, b.max_y])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn scan_range(&self, window: OffsetWindow) -> Result<Vec<Record>> {
        let lo = to_sql_offset(window.start)?;
        let hi = window.end.map_or(i64::MAX, |end| end.min(i64::MAX as u64) as i64);
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT uri, shape, server_offset FROM {}
             WHERE server_offset >= ?1 AND server_offset <= ?2
             ORDER BY server_offset",
            self.table
        ))?;
        let rows = stmt.query_map(params![lo, hi], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn min_max_offset(&self) -> Result<Option<(u64, u64)>> {
        let (lo, hi): (Option<i64>, Option<i64>) = self.conn.query_row(
            &format!("SELECT MIN(server_offset), MAX(server_offset) FROM {}", self.table),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(lo.zip(hi).map(|(lo, hi)| (lo as u64, hi as u64)))
    }

    fn offsets(&self) -> Result<Vec<u64>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT server_offset FROM {} ORDER BY server_offset",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        Ok(rows
            .map(|r| r.map(|o| o as u64))
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn end_offset(&self) -> Result<Option<u64>> {
        let end: Option<i64> = self
            .conn
            .query_row(
                "SELECT end_offset FROM geolimes_stream_end WHERE fingerprint = ?1",
                params![self.fingerprint.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(end.map(|e| e as u64))
    }

    fn set_end_offset(&mut self, end: Option<u64>) -> Result<()> {
        match end {
            Some(end) => self.conn.execute(
                "INSERT INTO geolimes_stream_end (fingerprint, end_offset) VALUES (?1, ?2)
                 ON CONFLICT(fingerprint) DO UPDATE SET end_offset = excluded.end_offset",
                params![self.fingerprint.as_str(), to_sql_offset(end)?],
            )?,
            None => self.conn.execute(
                "DELETE FROM geolimes_stream_end WHERE fingerprint = ?1",
                params![self.fingerprint.as_str()],
            )?,
        };
        Ok(())
    }

    /// R*Tree lookup. The tree stores boxes rounded outwards to 32-bit
    /// floats, so its hits are re-checked against the exact box.
    fn scan_bbox(&self, region: &BBox) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT t.uri, t.shape, t.server_offset
             FROM {} t JOIN {} r ON r.id = t.server_offset
             WHERE r.min_x <= ?1 AND r.max_x >= ?2 AND r.min_y <= ?3 AND r.max_y >= ?4
             ORDER BY t.server_offset",
            self.table, self.rtree
        ))?;
        let rows = stmt.query_map(
            params![region.max_x, region.min_x, region.max_y, region.min_y],
            row_to_record,
        )?;
        let candidates = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates
            .into_iter()
            .filter(|r| derive_bbox(&r.geometry).is_some_and(|b| b.intersects(region)))
            .collect())
    }

    /// Islands of consecutive offsets, computed in SQL.
    fn materialized(&self) -> Result<IntervalSet> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT MIN(server_offset), MAX(server_offset) FROM (
                SELECT server_offset,
                       server_offset - ROW_NUMBER() OVER (ORDER BY server_offset) AS island
                FROM {}
             )
             GROUP BY island
             ORDER BY 1",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
        })?;
        let mut set = IntervalSet::new();
        for row in rows {
            let (lo, hi) = row?;
            set.union(OffsetRange::new(lo, hi)?);
        }
        Ok(set)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        entity_id: row.get(0)?,
        geometry: row.get(1)?,
        server_offset: row.get::<_, i64>(2)? as u64,
    })
}

fn to_sql_offset(offset: u64) -> Result<i64> {
    i64::try_from(offset)
        .map_err(|_| CacheError::Persistence(format!("offset {offset} exceeds SQLite integer range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(Fingerprint::of_query("SELECT ?s ?g WHERE { ?s ?p ?g }")).unwrap()
    }

    #[test]
    fn test_insert_and_scan() {
        let mut store = store();
        store
            .insert_range(&[
                Record::new("c", "POINT(3 3)", 7),
                Record::new("a", "POINT(1 1)", 5),
                Record::new("b", "POINT(2 2)", 6),
            ])
            .unwrap();

        let rows = store.scan_range(OffsetWindow::bounded(6, 100).unwrap()).unwrap();
        assert_eq!(rows.iter().map(|r| r.server_offset).collect::<Vec<_>>(), vec![6, 7]);
        assert_eq!(store.min_max_offset().unwrap(), Some((5, 7)));
    }

    #[test]
    fn test_materialized_islands() {
        let mut store = store();
        let records: Vec<Record> = [0u64, 1, 2, 5, 6, 9]
            .iter()
            .map(|&o| Record::new(format!("r{o}"), "POINT(0 0)", o))
            .collect();
        store.insert_range(&records).unwrap();

        let set = store.materialized().unwrap();
        assert_eq!(
            set.ranges(),
            &[
                OffsetRange::new(0, 2).unwrap(),
                OffsetRange::new(5, 6).unwrap(),
                OffsetRange::point(9),
            ]
        );
        assert_eq!(
            store.find_gaps(OffsetRange::new(0, 10).unwrap()).unwrap(),
            vec![
                OffsetRange::new(3, 4).unwrap(),
                OffsetRange::new(7, 8).unwrap(),
                OffsetRange::point(10),
            ]
        );
    }

    #[test]
    fn test_duplicate_offsets_ignored() {
        let mut store = store();
        store.insert_range(&[Record::new("first", "POINT(0 0)", 0)]).unwrap();
        store.insert_range(&[Record::new("second", "POINT(1 1)", 0)]).unwrap();
        let rows = store.scan_range(OffsetWindow::unbounded(0)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "first");
    }

    #[test]
    fn test_scan_bbox_uses_rtree() {
        let mut store = store();
        store
            .insert_range(&[
                Record::new("inside", "POLYGON((1 1, 2 1, 2 2, 1 2, 1 1))", 0),
                Record::new("outside", "POINT(50 50)", 1),
                Record::new("garbage", "POLYGON((", 2),
                Record::new("empty", "POLYGON EMPTY", 3),
                Record::new("edge", "POINT(5 5)", 4),
            ])
            .unwrap();

        let hits = store.scan_bbox(&BBox::new(0.0, 0.0, 5.0, 5.0)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["inside", "edge"]);
        // Unparsable rows are still cached, just not in the tree.
        assert_eq!(store.offsets().unwrap(), vec![0, 1, 2, 3, 4]);
        let boxed: i64 = store
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", store.rtree()), [], |row| row.get(0))
            .unwrap();
        assert_eq!(boxed, 3);
    }

    #[test]
    fn test_rtree_is_a_virtual_table() {
        let store = store();
        let sql: String = store
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = ?1",
                params![store.rtree()],
                |row| row.get(0),
            )
            .unwrap();
        assert!(sql.contains("USING rtree"), "{sql}");
    }

    #[test]
    fn test_duplicate_offset_keeps_first_box() {
        let mut store = store();
        store.insert_range(&[Record::new("first", "POINT(1 1)", 0)]).unwrap();
        store.insert_range(&[Record::new("second", "POINT(9 9)", 0)]).unwrap();
        assert!(store.scan_bbox(&BBox::new(8.0, 8.0, 10.0, 10.0)).unwrap().is_empty());
        assert_eq!(store.scan_bbox(&BBox::point(1.0, 1.0)).unwrap().len(), 1);
    }

    #[test]
    fn test_end_offset_is_per_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache.sqlite");
        let a = Fingerprint::of_query("SELECT ?a WHERE { ?a ?b ?c }");
        let b = Fingerprint::of_query("SELECT ?x WHERE { ?x ?y ?z }");

        let mut sa = SqliteStore::open(&db, a.clone()).unwrap();
        sa.set_end_offset(Some(250)).unwrap();
        sa.set_end_offset(Some(300)).unwrap();
        let sb = SqliteStore::open(&db, b).unwrap();
        assert_eq!(sb.end_offset().unwrap(), None);
        drop(sa);

        let mut reopened = SqliteStore::open(&db, a).unwrap();
        assert_eq!(reopened.end_offset().unwrap(), Some(300));
        reopened.set_end_offset(None).unwrap();
        assert_eq!(reopened.end_offset().unwrap(), None);
    }

    #[test]
    fn test_tables_are_per_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache.sqlite");
        let a = Fingerprint::of_query("SELECT ?a WHERE { ?a ?b ?c }");
        let b = Fingerprint::of_query("SELECT ?x WHERE { ?x ?y ?z }");

        let mut sa = SqliteStore::open(&db, a.clone()).unwrap();
        sa.insert_range(&[Record::new("a", "POINT(0 0)", 0)]).unwrap();
        let sb = SqliteStore::open(&db, b).unwrap();
        assert_eq!(sb.min_max_offset().unwrap(), None);
        drop(sa);

        let reopened = SqliteStore::open(&db, a).unwrap();
        assert_eq!(reopened.offsets().unwrap(), vec![0]);
    }
}
