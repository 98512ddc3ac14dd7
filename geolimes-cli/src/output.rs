//! Result serialisation for the three output formats.

use crate::config::OutputFormat;
use geolimes_spatial::{MatchError, MatchOutcome, MatchResult, Relation};
use serde::Serialize;

const GEOSPARQL: &str = "http://www.opengis.net/ont/geosparql#";

/// Render `outcome` in `format`. The delimited and triple formats carry
/// results only; errors go to the error log.
pub fn render(outcome: &MatchOutcome, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Delimited => Ok(render_delimited(&outcome.results)),
        OutputFormat::TripleText => Ok(render_triples(&outcome.results)),
        OutputFormat::StructuredDocument => render_document(outcome),
    }
}

/// Error log body: one deduplicated message per line.
pub fn render_errors(errors: &[MatchError]) -> String {
    let mut out = String::new();
    for error in errors {
        out.push_str(&error.message());
        out.push('\n');
    }
    out
}

fn render_delimited(results: &[MatchResult]) -> String {
    let mut out = String::new();
    for r in results {
        out.push_str(&quote(&r.source_id));
        out.push(',');
        out.push_str(&quote(r.relation.name()));
        out.push(',');
        out.push_str(&quote(&r.target_id));
        if let Some(d) = r.distance {
            out.push(',');
            out.push_str(&quote(&d.to_string()));
        }
        out.push('\n');
    }
    out
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn render_triples(results: &[MatchResult]) -> String {
    let mut out = String::new();
    for r in results {
        out.push_str(&format!(
            "{} <{}> {} .",
            iri(&r.source_id),
            relation_iri(r.relation),
            iri(&r.target_id)
        ));
        if let Some(d) = r.distance {
            out.push_str(&format!(" # distance={d}"));
        }
        out.push('\n');
    }
    out
}

/// `<id>`, escaping the characters N-Triples forbids inside an IRI.
fn iri(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 2);
    out.push('<');
    for c in id.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | ' ' => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out.push('>');
    out
}

/// GeoSPARQL simple-features or Egenhofer property for `relation`, or a
/// geolimes URN for relations GeoSPARQL does not name.
pub fn relation_iri(relation: Relation) -> String {
    let local = match relation {
        Relation::Contains => "sfContains",
        Relation::Crosses => "sfCrosses",
        Relation::Disjoint => "sfDisjoint",
        Relation::Equals => "sfEquals",
        Relation::Intersects => "sfIntersects",
        Relation::Overlaps => "sfOverlaps",
        Relation::Touches => "sfTouches",
        Relation::Within => "sfWithin",
        Relation::Covers => "ehCovers",
        Relation::CoveredBy => "ehCoveredBy",
        Relation::ContainsProperly | Relation::Distance | Relation::HausdorffDistance => {
            return format!("urn:geolimes:relation:{}", relation.name());
        }
    };
    format!("{GEOSPARQL}{local}")
}

#[derive(Serialize)]
struct Document<'a> {
    results: &'a [MatchResult],
    errors: Vec<String>,
}

fn render_document(outcome: &MatchOutcome) -> Result<String, serde_json::Error> {
    let doc = Document {
        results: &outcome.results,
        errors: outcome.errors.iter().map(MatchError::message).collect(),
    };
    serde_json::to_string_pretty(&doc)
}
