//! Parallel matching of source records against a target snapshot.
//!
//! The source side is cut into fixed-size chunks by position. Each chunk runs
//! on a worker of a dedicated rayon pool with shared references to the
//! snapshot and predicate set; workers return local results and errors, which
//! are merged on the calling thread once every chunk has finished.

use crate::config::MatchConfig;
use crate::error::{Result, SpatialError};
use crate::geometry::parse_valid;
use crate::outcome::{dedup_errors, MatchError, MatchOutcome, MatchResult, MatchStats};
use crate::predicate::PredicateSet;
use crate::snapshot::{TargetSnapshot, TargetState};
use geolimes_core::Record;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Output of one chunk.
#[derive(Default)]
struct ChunkOutput {
    results: Vec<MatchResult>,
    errors: Vec<MatchError>,
    stats: MatchStats,
}

/// Owns the worker pool. One engine can serve many runs.
pub struct MatchingEngine {
    config: MatchConfig,
    pool: ThreadPool,
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("config", &self.config)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl MatchingEngine {
    pub fn new(config: MatchConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.resolved_workers();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("geolimes-match-{i}"))
            .build()
            .map_err(|e| SpatialError::ThreadPool(e.to_string()))?;
        tracing::debug!(workers, chunk_size = config.chunk_size, "matching pool ready");
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Build a target snapshot using this engine's pool.
    pub fn snapshot(&self, targets: Vec<Record>) -> TargetSnapshot {
        self.pool.install(|| TargetSnapshot::build(targets))
    }

    /// Match every source record against `snapshot`.
    ///
    /// The set of results does not depend on chunk size or worker count.
    /// Result order is unspecified. Errors are deduplicated by message.
    pub fn run(
        &self,
        sources: &[Record],
        snapshot: &TargetSnapshot,
        predicates: &PredicateSet,
    ) -> MatchOutcome {
        let span = tracing::info_span!(
            "match",
            sources = sources.len(),
            targets = snapshot.len(),
            relations = ?predicates.relations(),
        );
        let _guard = span.enter();

        let full_scan = predicates.needs_full_scan();
        let chunk_size = self.config.chunk_size;

        let chunks: Vec<ChunkOutput> = self.pool.install(|| {
            sources
                .par_chunks(chunk_size)
                .map(|chunk| match_chunk(chunk, snapshot, predicates, full_scan))
                .collect()
        });

        let mut outcome = MatchOutcome::default();
        let mut errors = snapshot.build_errors().to_vec();
        for chunk in chunks {
            outcome.results.extend(chunk.results);
            errors.extend(chunk.errors);
            outcome.stats.merge(&chunk.stats);
        }
        outcome.errors = dedup_errors(errors);

        tracing::info!(
            results = outcome.results.len(),
            errors = outcome.errors.len(),
            chunks = outcome.stats.chunks,
            exact_checks = outcome.stats.exact_checks,
            full_scan,
            "matching complete"
        );
        outcome
    }
}

fn match_chunk(
    chunk: &[Record],
    snapshot: &TargetSnapshot,
    predicates: &PredicateSet,
    full_scan: bool,
) -> ChunkOutput {
    let mut out = ChunkOutput::default();
    out.stats.chunks = 1;
    let mut scratch: Vec<usize> = Vec::new();

    for source in chunk {
        out.stats.source_records += 1;

        let parsed = match parse_valid(&source.geometry) {
            Ok(p) => p,
            Err(e) => {
                out.stats.invalid_sources += 1;
                out.errors
                    .push(MatchError::invalid_geometry(&source.entity_id, e));
                continue;
            }
        };
        // Empty geometries have no extent to compare.
        let Some(region) = parsed.query_region() else {
            continue;
        };

        let candidates: &[usize] = if full_scan {
            snapshot.indexed()
        } else {
            scratch.clear();
            scratch.extend(snapshot.index().query(&region));
            scratch.sort_unstable();
            &scratch
        };
        out.stats.candidates += candidates.len();

        for &seq in candidates {
            let Some(target) = snapshot.get(seq) else {
                continue;
            };
            let geometry = match &target.state {
                TargetState::Valid(p) => &p.geometry,
                TargetState::Invalid { reason, .. } => {
                    out.errors
                        .push(MatchError::invalid_geometry(&target.record.entity_id, reason));
                    continue;
                }
                TargetState::Unparsable { .. } => continue,
            };

            out.stats.exact_checks += 1;
            match predicates.evaluate(&parsed.geometry, geometry) {
                Ok(hits) => {
                    out.results.extend(hits.into_iter().map(|hit| MatchResult {
                        source_id: source.entity_id.clone(),
                        relation: hit.relation,
                        target_id: target.record.entity_id.clone(),
                        distance: hit.distance,
                    }));
                }
                Err(reason) => {
                    tracing::debug!(
                        source = %source.entity_id,
                        target = %target.record.entity_id,
                        %reason,
                        "predicate evaluation failed"
                    );
                    out.errors.push(MatchError::predicate_evaluation(
                        &source.entity_id,
                        &target.record.entity_id,
                        reason,
                    ));
                }
            }
        }
    }

    out
}
