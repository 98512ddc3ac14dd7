//! Delimited-text backend: one CSV file per fingerprint.
//!
//! Layout: header line `uri,shape,offset`, then one row per record with every
//! field double-quoted (`"` escaped as `""`). Rows are appended per chunk, so
//! the file is not necessarily sorted; the in-memory map restores order.
//!
//! The end-of-stream offset lives next to it in `<fingerprint>.eos`, a single
//! decimal number. The file is absent while no end is known.

use super::CacheStore;
use crate::error::{CacheError, Result};
use geolimes_core::{Fingerprint, OffsetWindow, Record};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const HEADER: &str = "uri,shape,offset";

/// CSV-backed store. The whole file is loaded on open.
#[derive(Debug)]
pub struct FileStore {
    fingerprint: Fingerprint,
    path: PathBuf,
    eos_path: PathBuf,
    rows: BTreeMap<u64, Record>,
    end_offset: Option<u64>,
}

impl FileStore {
    /// Open `<dir>/<fingerprint>.csv`, creating the directory if needed.
    ///
    /// A torn trailing row (left by an interrupted write) is dropped and the
    /// file rewritten without it.
    pub fn open(dir: &Path, fingerprint: Fingerprint) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
        let path = dir.join(format!("{fingerprint}.csv"));
        let eos_path = dir.join(format!("{fingerprint}.eos"));

        let mut store = Self {
            fingerprint,
            path,
            end_offset: read_end_offset(&eos_path)?,
            eos_path,
            rows: BTreeMap::new(),
        };
        if !store.path.exists() {
            return Ok(store);
        }

        let text = fs::read_to_string(&store.path).map_err(|e| CacheError::io(&store.path, e))?;
        let (fields, mut damaged) = parse_rows(&text);
        for (i, row) in fields.into_iter().enumerate() {
            if i == 0 && row.len() == 3 && row[0] == "uri" && row[2] == "offset" {
                continue;
            }
            match decode_row(row) {
                Some(record) => {
                    store.rows.entry(record.server_offset).or_insert(record);
                }
                None => damaged = true,
            }
        }

        if damaged {
            tracing::warn!(path = %store.path.display(), rows = store.rows.len(), "dropping damaged cache rows");
            store.rewrite()?;
        }
        tracing::debug!(path = %store.path.display(), rows = store.rows.len(), "file store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn rewrite(&self) -> Result<()> {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        for record in self.rows.values() {
            encode_row(record, &mut out);
        }
        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, out).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| CacheError::io(&self.path, e))
    }
}

impl CacheStore for FileStore {
    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    fn insert_range(&mut self, records: &[Record]) -> Result<()> {
        let fresh: Vec<&Record> = records
            .iter()
            .filter(|r| !self.rows.contains_key(&r.server_offset))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let mut out = String::new();
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        if needs_header {
            out.push_str(HEADER);
            out.push('\n');
        }
        for record in &fresh {
            encode_row(record, &mut out);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CacheError::io(&self.path, e))?;
        file.write_all(out.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| CacheError::io(&self.path, e))?;

        for record in fresh {
            self.rows.insert(record.server_offset, record.clone());
        }
        Ok(())
    }

    fn scan_range(&self, window: OffsetWindow) -> Result<Vec<Record>> {
        let rows = match window.end {
            Some(end) if end < window.start => return Ok(Vec::new()),
            Some(end) => self.rows.range(window.start..=end),
            None => self.rows.range(window.start..),
        };
        Ok(rows.map(|(_, r)| r.clone()).collect())
    }

    fn min_max_offset(&self) -> Result<Option<(u64, u64)>> {
        Ok(self
            .rows
            .keys()
            .next()
            .zip(self.rows.keys().next_back())
            .map(|(lo, hi)| (*lo, *hi)))
    }

    fn offsets(&self) -> Result<Vec<u64>> {
        Ok(self.rows.keys().copied().collect())
    }

    fn end_offset(&self) -> Result<Option<u64>> {
        Ok(self.end_offset)
    }

    fn set_end_offset(&mut self, end: Option<u64>) -> Result<()> {
        if end == self.end_offset {
            return Ok(());
        }
        match end {
            Some(end) => {
                let tmp = self.eos_path.with_extension("eos.tmp");
                fs::write(&tmp, format!("{end}\n")).map_err(|e| CacheError::io(&tmp, e))?;
                fs::rename(&tmp, &self.eos_path).map_err(|e| CacheError::io(&self.eos_path, e))?;
            }
            None => match fs::remove_file(&self.eos_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(&self.eos_path, e)),
            },
        }
        self.end_offset = end;
        Ok(())
    }
}

/// A missing or unreadable marker means no end is known.
fn read_end_offset(path: &Path) -> Result<Option<u64>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    let end = text.trim().parse::<u64>().ok();
    if end.is_none() {
        tracing::warn!(path = %path.display(), "ignoring damaged end-of-stream marker");
    }
    Ok(end)
}

fn quote(field: &str, out: &mut String) {
    out.push('"');
    out.push_str(&field.replace('"', "\"\""));
    out.push('"');
}

fn encode_row(record: &Record, out: &mut String) {
    quote(&record.entity_id, out);
    out.push(',');
    quote(&record.geometry, out);
    out.push(',');
    quote(&record.server_offset.to_string(), out);
    out.push('\n');
}

fn decode_row(mut row: Vec<String>) -> Option<Record> {
    if row.len() != 3 {
        return None;
    }
    let server_offset = row.pop()?.parse::<u64>().ok()?;
    let geometry = row.pop()?;
    let entity_id = row.pop()?;
    Some(Record {
        entity_id,
        geometry,
        server_offset,
    })
}

/// Split CSV text into rows of fields. Quoted fields may contain commas,
/// newlines and doubled quotes. The flag is true when the text ends inside
/// an unterminated row.
fn parse_rows(text: &str) -> (Vec<Vec<String>>, bool) {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                pending = true;
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                pending = true;
            }
            '\r' => {}
            '\n' => {
                if pending || !field.is_empty() {
                    fields.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut fields));
                }
                pending = false;
            }
            _ => {
                field.push(c);
                pending = true;
            }
        }
    }

    (rows, in_quotes || pending)
}
