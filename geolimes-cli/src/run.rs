//! The link pipeline: materialise both datasets, match them, write the
//! artifacts.
//!
//! ```text
//!   LinkTask ──► materialize(source) ─┐
//!            └─► materialize(target) ─┴─► spawn_blocking(match) ──► RunReport
//!                                                                     │
//!                              output/<src>_<tgt>.<ext>  ◄────────────┤
//!                              logs/<src>_<tgt>_errors.log ◄──────────┘
//! ```

use crate::config::{ConfigError, LinkTask, OutputFormat, Side, SideTask};
use crate::output;
use geolimes_cache::{Cache, CacheError, Dataset, RetryPolicy, StoreKind};
use geolimes_core::Fingerprint;
use geolimes_spatial::{MatchConfig, MatchOutcome, MatchingEngine, PredicateSet, SpatialError};
use geolimes_sparql::{HttpQuerySource, SparqlError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{side} query source could not be created: {source}")]
    Source {
        side: Side,
        #[source]
        source: SparqlError,
    },

    #[error("{side} dataset could not be materialized: {source}")]
    Fetch {
        side: Side,
        #[source]
        source: CacheError,
    },

    #[error("Matching failed: {0}")]
    Matching(#[from] SpatialError),

    #[error("Matching task failed: {0}")]
    Task(String),

    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RunError {
    /// The remote endpoint failed or sent something unreadable.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            RunError::Fetch {
                source: CacheError::RemoteFetch { .. } | CacheError::Decode(_),
                ..
            }
        )
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        RunError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type RunResult<T> = std::result::Result<T, RunError>;

/// The directory tree a run writes into.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Create `cache/`, `logs/` and `output/` if missing.
    pub async fn prepare(&self) -> RunResult<()> {
        for dir in [self.cache_dir(), self.logs_dir(), self.output_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| RunError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// SQLite database file; the per-fingerprint CSV files are used when absent.
    pub database: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub workers: Option<usize>,
}

impl RunOptions {
    fn store_kind(&self, workspace: &Workspace) -> StoreKind {
        match &self.database {
            Some(path) => StoreKind::Sqlite { path: path.clone() },
            None => StoreKind::File {
                dir: workspace.cache_dir(),
            },
        }
    }

    fn match_config(&self) -> MatchConfig {
        let mut config = MatchConfig::default();
        if let Some(n) = self.chunk_size {
            config = config.with_chunk_size(n);
        }
        if let Some(n) = self.workers {
            config = config.with_workers(n);
        }
        config
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub source_fingerprint: Fingerprint,
    pub target_fingerprint: Fingerprint,
    pub source_records: usize,
    pub target_records: usize,
    pub format: OutputFormat,
    pub outcome: MatchOutcome,
    pub output_path: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
}

impl RunReport {
    /// `<source fingerprint>_<target fingerprint>`, the artifact file stem.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.source_fingerprint, self.target_fingerprint)
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} source / {} target records: {} links, {} errors",
            self.source_records,
            self.target_records,
            self.outcome.results.len(),
            self.outcome.errors.len()
        );
        if let Some(path) = &self.output_path {
            line.push_str(&format!(" -> {}", path.display()));
        }
        if let Some(log) = self.error_log.as_ref().filter(|_| !self.outcome.errors.is_empty()) {
            line.push_str(&format!(" (errors in {})", log.display()));
        }
        line
    }
}

pub struct Pipeline {
    workspace: Workspace,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(workspace: Workspace, options: RunOptions) -> Self {
        Self { workspace, options }
    }

    /// Materialise and match without writing result artifacts.
    pub async fn execute(&self, task: &LinkTask) -> RunResult<RunReport> {
        self.workspace.prepare().await?;
        let store = self.options.store_kind(&self.workspace);
        tracing::info!(
            store = store.name(),
            source = %task.source.fingerprint(),
            target = %task.target.fingerprint(),
            "starting link run"
        );

        // One side at a time: a shared fingerprint must never be fetched
        // concurrently.
        let source = materialize(&task.source, &store, &task.retry).await?;
        let target = materialize(&task.target, &store, &task.retry).await?;

        let source_records = source.len();
        let target_records = target.len();
        let outcome = match_datasets(
            source,
            target,
            task.predicates.clone(),
            self.options.match_config(),
        )
        .await?;

        Ok(RunReport {
            source_fingerprint: task.source.fingerprint(),
            target_fingerprint: task.target.fingerprint(),
            source_records,
            target_records,
            format: task.output,
            outcome,
            output_path: None,
            error_log: None,
        })
    }

    /// Run and write `output/<stem>.<ext>` and `logs/<stem>_errors.log`.
    pub async fn run_to_files(&self, task: &LinkTask) -> RunResult<RunReport> {
        let mut report = self.execute(task).await?;
        let stem = report.stem();

        let output_path = self
            .workspace
            .output_dir()
            .join(format!("{stem}.{}", report.format.extension()));
        let body = output::render(&report.outcome, report.format)?;
        tokio::fs::write(&output_path, body)
            .await
            .map_err(|e| RunError::io(&output_path, e))?;

        let error_log = self.workspace.logs_dir().join(format!("{stem}_errors.log"));
        tokio::fs::write(&error_log, output::render_errors(&report.outcome.errors))
            .await
            .map_err(|e| RunError::io(&error_log, e))?;

        tracing::info!(
            output = %output_path.display(),
            errors = report.outcome.errors.len(),
            "results written"
        );
        report.output_path = Some(output_path);
        report.error_log = Some(error_log);
        Ok(report)
    }
}

async fn materialize(side: &SideTask, store: &StoreKind, retry: &RetryPolicy) -> RunResult<Dataset> {
    let fetch_err = |source: CacheError| RunError::Fetch {
        side: side.side,
        source,
    };

    let remote = HttpQuerySource::new(side.endpoint.clone(), side.query.clone())
        .map_err(|source| RunError::Source {
            side: side.side,
            source,
        })?;
    let fingerprint = side.fingerprint();
    let store = store.open(&fingerprint).map_err(fetch_err)?;
    let mut cache = Cache::open(Arc::new(remote), store)
        .map_err(fetch_err)?
        .with_retry(retry.clone());

    let dataset = cache
        .materialize(side.window, side.chunksize)
        .await
        .map_err(fetch_err)?;
    tracing::info!(
        side = %side.side,
        records = dataset.len(),
        fetches = dataset.stats.fetches,
        "dataset ready"
    );
    Ok(dataset)
}

/// Build the target snapshot and match on the blocking pool so the async
/// runtime stays responsive.
async fn match_datasets(
    source: Dataset,
    target: Dataset,
    predicates: PredicateSet,
    config: MatchConfig,
) -> RunResult<MatchOutcome> {
    let handle = tokio::task::spawn_blocking(move || -> Result<MatchOutcome, SpatialError> {
        let engine = MatchingEngine::new(config)?;
        let snapshot = engine.snapshot(target.records);
        Ok(engine.run(&source.records, &snapshot, &predicates))
    });
    let outcome = handle.await.map_err(|e| RunError::Task(e.to_string()))??;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_prepare_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path());
        ws.prepare().await.unwrap();
        assert!(ws.cache_dir().is_dir());
        assert!(ws.logs_dir().is_dir());
        assert!(ws.output_dir().is_dir());
        // idempotent
        ws.prepare().await.unwrap();
    }

    #[test]
    fn test_store_kind_selection() {
        let ws = Workspace::new("/work");
        let file = RunOptions::default().store_kind(&ws);
        assert_eq!(
            file,
            StoreKind::File {
                dir: PathBuf::from("/work/cache")
            }
        );

        let options = RunOptions {
            database: Some(PathBuf::from("/work/links.db")),
            ..Default::default()
        };
        assert_eq!(options.store_kind(&ws).name(), "sqlite");
    }

    #[test]
    fn test_match_config_overrides() {
        let options = RunOptions {
            chunk_size: Some(25),
            workers: Some(3),
            ..Default::default()
        };
        let config = options.match_config();
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.workers, Some(3));
    }

    #[test]
    fn test_remote_classification() {
        let remote = RunError::Fetch {
            side: Side::Source,
            source: CacheError::remote(0, "HTTP 502", true),
        };
        assert!(remote.is_remote());

        let persistence = RunError::Fetch {
            side: Side::Target,
            source: CacheError::Persistence("disk full".into()),
        };
        assert!(!persistence.is_remote());
    }
}
