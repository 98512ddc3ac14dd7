//! Decoding of `application/sparql-results+json` documents.

use crate::error::{Result, SparqlError};
use geolimes_cache::SourceRow;
use serde::Deserialize;
use std::collections::HashMap;

pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

#[derive(Debug, Deserialize)]
struct ResultsDocument {
    results: ResultsBody,
}

#[derive(Debug, Deserialize)]
struct ResultsBody {
    #[serde(default)]
    bindings: Vec<HashMap<String, Binding>>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    value: String,
}

/// Extract `(uri, shape)` rows in document order. Solutions missing either
/// variable are skipped.
pub fn decode_rows(body: &[u8], uri_var: &str, shape_var: &str) -> Result<Vec<SourceRow>> {
    let doc: ResultsDocument =
        serde_json::from_slice(body).map_err(|e| SparqlError::Results(e.to_string()))?;

    let total = doc.results.bindings.len();
    let rows: Vec<SourceRow> = doc
        .results
        .bindings
        .into_iter()
        .filter_map(|mut solution| {
            let uri = solution.remove(uri_var)?.value;
            let shape = solution.remove(shape_var)?.value;
            Some(SourceRow { uri, shape })
        })
        .collect();

    if rows.len() < total {
        tracing::debug!(
            dropped = total - rows.len(),
            uri_var,
            shape_var,
            "solutions without both bindings dropped"
        );
    }
    Ok(rows)
}
