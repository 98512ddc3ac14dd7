//! Run configuration: the JSON document naming both datasets, the relations
//! to test and the output format.

use geolimes_cache::{RetryPolicy, DEFAULT_CHUNKSIZE};
use geolimes_core::{Fingerprint, OffsetWindow};
use geolimes_spatial::{PredicateSet, Relation, SpatialError};
use geolimes_sparql::{Prefix, SelectQuery, Selection, SparqlError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Why a configuration was rejected. Always raised before any fetch.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Cannot read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Config is missing {0}")]
    Missing(String),

    #[error("Relation not valid: {name}. Valid relations: {valid}")]
    UnknownRelation { name: String, valid: String },

    #[error("Invalid {side} query: {source}")]
    Query {
        side: Side,
        #[source]
        source: SparqlError,
    },

    #[error("Invalid measure: {0}")]
    Measure(SpatialError),

    #[error("{side} chunksize must be greater than 0")]
    Chunksize { side: Side },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which dataset a setting belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result variable names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarConfig {
    pub uri: Option<String>,
    pub shape: Option<String>,
}

/// One side of the link task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideConfig {
    pub endpoint: Option<String>,
    pub graph: Option<String>,
    pub property: Option<String>,
    pub restriction: Option<String>,
    pub rawquery: Option<String>,
    pub var: Option<VarConfig>,
    #[serde(default)]
    pub offset: u64,
    /// `<= 0` or absent: fetch until the endpoint runs out of rows.
    pub limit: Option<i64>,
    pub chunksize: Option<usize>,
}

/// `"relation": "within"` or `"relation": ["within", "touches"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationSpec {
    One(String),
    Many(Vec<String>),
}

impl RelationSpec {
    fn names(&self) -> Vec<&str> {
        match self {
            RelationSpec::One(name) => vec![name.as_str()],
            RelationSpec::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureConfig {
    pub relation: Option<RelationSpec>,
    pub threshold: Option<f64>,
}

/// Serialisation of the match results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Quoted comma-separated lines.
    #[default]
    Delimited,
    /// One N-Triples statement per result.
    TripleText,
    /// A JSON document with `results` and `errors`.
    StructuredDocument,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Delimited => "csv",
            OutputFormat::TripleText => "nt",
            OutputFormat::StructuredDocument => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Delimited => "text/csv",
            OutputFormat::TripleText => "application/n-triples",
            OutputFormat::StructuredDocument => "application/json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// The raw run configuration as read from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub prefixes: Vec<Prefix>,
    pub source: Option<SideConfig>,
    pub target: Option<SideConfig>,
    pub measure: Option<MeasureConfig>,
    #[serde(default)]
    pub output: OutputFormat,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl LinkConfig {
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    /// Check every rule and resolve the typed settings.
    pub fn validate(&self) -> ConfigResult<LinkTask> {
        let source = self.side(Side::Source)?;
        let target = self.side(Side::Target)?;
        let predicates = self.predicates()?;
        Ok(LinkTask {
            source,
            target,
            predicates,
            output: self.output,
            retry: RetryPolicy::new(
                self.retry.max_retries,
                Duration::from_millis(self.retry.initial_backoff_ms),
                Duration::from_millis(self.retry.max_backoff_ms),
            ),
        })
    }

    fn side(&self, side: Side) -> ConfigResult<SideTask> {
        let config = match side {
            Side::Source => self.source.as_ref(),
            Side::Target => self.target.as_ref(),
        }
        .ok_or_else(|| ConfigError::Missing(side.to_string()))?;

        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ConfigError::Missing(format!("{side} endpoint")))?;
        let var = config
            .var
            .as_ref()
            .ok_or_else(|| ConfigError::Missing(format!("{side} var")))?;
        let uri_var = var
            .uri
            .clone()
            .ok_or_else(|| ConfigError::Missing(format!("{side} var.uri")))?;
        let shape_var = var
            .shape
            .clone()
            .ok_or_else(|| ConfigError::Missing(format!("{side} var.shape")))?;

        if config.rawquery.is_none() {
            if config.graph.is_none() {
                return Err(ConfigError::Missing(format!("{side} graph")));
            }
            if config.property.is_none() {
                return Err(ConfigError::Missing(format!("{side} property")));
            }
        }
        if config.chunksize == Some(0) {
            return Err(ConfigError::Chunksize { side });
        }

        let query = SelectQuery::new(Selection {
            prefixes: self.prefixes.clone(),
            graph: config.graph.clone(),
            property: config.property.clone(),
            restriction: config.restriction.clone(),
            rawquery: config.rawquery.clone(),
            uri_var,
            shape_var,
        })
        .map_err(|source| ConfigError::Query { side, source })?;

        Ok(SideTask {
            side,
            endpoint,
            query,
            window: OffsetWindow::from_offset_limit(config.offset, config.limit.unwrap_or(-1)),
            chunksize: config.chunksize.unwrap_or(DEFAULT_CHUNKSIZE),
        })
    }

    fn predicates(&self) -> ConfigResult<PredicateSet> {
        let measure = self
            .measure
            .as_ref()
            .ok_or_else(|| ConfigError::Missing("measure".into()))?;
        let spec = measure
            .relation
            .as_ref()
            .ok_or_else(|| ConfigError::Missing("measure relation".into()))?;

        let mut relations = Vec::new();
        for name in spec.names() {
            let relation = name.parse::<Relation>().map_err(|_| ConfigError::UnknownRelation {
                name: name.to_string(),
                valid: Relation::ALL.map(Relation::name).join(", "),
            })?;
            relations.push(relation);
        }

        if relations.iter().any(|r| r.is_metric()) && measure.threshold.is_none() {
            return Err(ConfigError::Missing("measure threshold".into()));
        }

        PredicateSet::new(relations, measure.threshold).map_err(ConfigError::Measure)
    }
}

/// Validated settings for one side.
#[derive(Debug, Clone)]
pub struct SideTask {
    pub side: Side,
    pub endpoint: String,
    pub query: SelectQuery,
    pub window: OffsetWindow,
    pub chunksize: usize,
}

impl SideTask {
    pub fn fingerprint(&self) -> Fingerprint {
        self.query.fingerprint()
    }
}

/// A fully validated link task.
#[derive(Debug, Clone)]
pub struct LinkTask {
    pub source: SideTask,
    pub target: SideTask,
    pub predicates: PredicateSet,
    pub output: OutputFormat,
    pub retry: RetryPolicy,
}
