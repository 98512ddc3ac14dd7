//! Gap-aware materialisation of a paginated remote dataset.
//!
//! # Algorithm
//!
//! 1. Plan: subtract the materialised ranges from the requested window and
//!    clip bounded windows at the recorded end of stream. For open windows
//!    that overlap what is cached, probe one row past the maximum to learn
//!    whether the stream grew.
//! 2. Fetch every missing interval with the chunked loop: page through it at
//!    `chunksize` rows, shrinking the page size (never growing it back) when
//!    the server reports a smaller row cap, until the interval is closed or a
//!    short read marks the end of the stream.
//! 3. Re-read the requested window from the store.
//!
//! Offsets are assigned in arrival order from the page's start offset. Rows are
//! persisted after every page, so a failure leaves earlier pages usable. The
//! end of stream is persisted too: a short read or empty probe records it,
//! and rows arriving at or past it clear it again.

use crate::encoding::decode_body;
use crate::error::Result;
use crate::range_index::{MissingInterval, RangeIndex};
use crate::retry::RetryPolicy;
use crate::source::{RemoteQuerySource, ServerHints};
use crate::store::CacheStore;
use geolimes_core::{Fingerprint, OffsetRange, OffsetWindow, Record};
use std::sync::Arc;
use tracing::Instrument;

/// Default rows per page.
pub const DEFAULT_CHUNKSIZE: usize = 1000;

/// Fetch counters for one `materialize` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Calls made to the remote source, probes included.
    pub fetches: usize,
    pub rows_fetched: usize,
    /// Page size in effect when the call finished.
    pub final_chunksize: usize,
}

/// The materialised rows of a window.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub fingerprint: Fingerprint,
    pub window: OffsetWindow,

    /// Ascending by `server_offset`.
    pub records: Vec<Record>,

    /// The recorded end of stream falls inside this window: there is nothing
    /// past its last row.
    pub end_of_stream: bool,

    pub stats: FetchStats,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Cache for one fingerprint: a remote source in front of a store.
///
/// Calls to [`Cache::materialize`] take `&mut self`; one fingerprint is never
/// fetched by two calls at once.
pub struct Cache {
    fingerprint: Fingerprint,
    source: Arc<dyn RemoteQuerySource>,
    store: Box<dyn CacheStore>,
    ranges: RangeIndex,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("fingerprint", &self.fingerprint)
            .field("ranges", &self.ranges)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Mutable state of one `materialize` call.
struct FetchRun {
    chunksize: usize,
    stats: FetchStats,
}

impl Cache {
    /// Wrap `store`, rebuilding the range index from its contents.
    pub fn open(source: Arc<dyn RemoteQuerySource>, store: Box<dyn CacheStore>) -> Result<Self> {
        let ranges = RangeIndex::load(store.as_ref())?;
        let fingerprint = store.fingerprint().clone();
        tracing::debug!(
            fingerprint = %fingerprint,
            ranges = ranges.ranges().ranges().len(),
            max_offset = ?ranges.max_offset(),
            end_offset = ?ranges.end_offset(),
            "cache opened"
        );
        Ok(Self {
            fingerprint,
            source,
            store,
            ranges,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn ranges(&self) -> &RangeIndex {
        &self.ranges
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    /// Make sure every offset of `window` that exists remotely is persisted,
    /// then return the window's rows.
    pub async fn materialize(&mut self, window: OffsetWindow, chunksize: usize) -> Result<Dataset> {
        let span = tracing::info_span!(
            "materialize",
            fingerprint = %self.fingerprint,
            window = %window,
            chunksize
        );
        self.materialize_inner(window, chunksize.max(1))
            .instrument(span)
            .await
    }

    async fn materialize_inner(&mut self, window: OffsetWindow, chunksize: usize) -> Result<Dataset> {
        let plan = self.ranges.plan(window);
        let mut run = FetchRun {
            chunksize,
            stats: FetchStats::default(),
        };
        if plan.is_noop() {
            tracing::debug!("window already materialized");
        }

        let mut missing = plan.missing;
        if let Some(at) = plan.probe_at {
            let got = self.fetch_page(at, 1, &mut run).await?.0;
            if got == 0 {
                tracing::debug!(offset = at, "probe found no new rows");
                self.mark_end(at)?;
            } else {
                tracing::debug!(offset = at, "probe found new rows");
                missing.push(MissingInterval::open(at + 1));
            }
        }

        for interval in missing {
            if self.ranges.end_offset().is_some_and(|end| interval.lo >= end) {
                tracing::debug!(interval = %interval, "past end of stream, skipping");
                continue;
            }
            self.fetch_interval(interval, &mut run).await?;
        }

        let records = self.store.scan_range(window)?;
        run.stats.final_chunksize = run.chunksize;
        let end_of_stream = self
            .ranges
            .end_offset()
            .is_some_and(|end| window.end.map_or(true, |hi| end <= hi));
        tracing::info!(
            rows = records.len(),
            fetches = run.stats.fetches,
            rows_fetched = run.stats.rows_fetched,
            end_of_stream,
            "materialized"
        );

        Ok(Dataset {
            fingerprint: self.fingerprint.clone(),
            window,
            records,
            end_of_stream,
            stats: run.stats,
        })
    }

    /// The chunked fetch loop for one missing interval.
    async fn fetch_interval(&mut self, interval: MissingInterval, run: &mut FetchRun) -> Result<()> {
        let mut cursor = interval.lo;
        loop {
            let want = match interval.hi {
                Some(hi) if cursor > hi => break,
                Some(hi) => (run.chunksize as u64).min(hi - cursor + 1) as usize,
                None => run.chunksize,
            };

            let (got, hints) = self.fetch_page(cursor, want, run).await?;

            let mut expected = want;
            if let Some(cap) = hints.max_server_rows.filter(|&cap| cap > 0) {
                expected = expected.min(cap);
                if cap < run.chunksize {
                    tracing::info!(
                        from = run.chunksize,
                        to = cap,
                        "server caps rows per page, shrinking chunksize"
                    );
                    run.chunksize = cap;
                }
            }

            cursor += got as u64;
            if got < expected {
                tracing::debug!(offset = cursor, got, expected, "short read, end of stream");
                self.mark_end(cursor)?;
                break;
            }
        }
        Ok(())
    }

    /// Fetch, decode and persist one page at `offset`. Returns the number of
    /// rows persisted and the server's hints.
    async fn fetch_page(
        &mut self,
        offset: u64,
        limit: usize,
        run: &mut FetchRun,
    ) -> Result<(usize, ServerHints)> {
        let source = Arc::clone(&self.source);
        let retry = self.retry.clone();
        let page = retry.run(|| source.fetch(offset, limit)).await?;
        run.stats.fetches += 1;

        let body = decode_body(page.body, page.hints.content_encoding)?;
        let mut rows = source.decode_rows(&body)?;
        if rows.len() > limit {
            tracing::debug!(returned = rows.len(), limit, "truncating oversized page");
            rows.truncate(limit);
        }

        let records: Vec<Record> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| Record::new(row.uri, row.shape, offset + i as u64))
            .collect();
        let got = records.len();
        tracing::trace!(offset, limit, rows = got, "page fetched");

        if got > 0 {
            self.store.insert_range(&records)?;
            let hi = offset + got as u64 - 1;
            self.ranges.record(OffsetRange { lo: offset, hi });
            if self.ranges.end_offset().is_some_and(|end| hi >= end) {
                tracing::info!(offset = hi, "stream grew past its recorded end");
                self.store.set_end_offset(None)?;
                self.ranges.set_end_offset(None);
            }
        }
        run.stats.rows_fetched += got;
        Ok((got, page.hints))
    }

    /// Persist `at` as the first missing offset. An earlier, lower end stays.
    fn mark_end(&mut self, at: u64) -> Result<()> {
        let end = self.ranges.end_offset().map_or(at, |known| known.min(at));
        if self.ranges.end_offset() != Some(end) {
            self.store.set_end_offset(Some(end))?;
            self.ranges.set_end_offset(Some(end));
        }
        Ok(())
    }
}
