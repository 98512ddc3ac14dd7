//! SELECT query construction.
//!
//! A selection is either a raw query, to which `OFFSET`/`LIMIT` are appended,
//! or a graph plus property (and optional restriction) pattern that is
//! expanded into a `SELECT DISTINCT` over the configured variables. The
//! fingerprint of a selection is taken over the canonical text of the query
//! at offset 0 without a limit, so paging parameters never change it.

use crate::error::{Result, SparqlError};
use geolimes_core::{canonicalize_query, Fingerprint};
use serde::{Deserialize, Serialize};

/// `PREFIX label: <namespace>` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefix {
    pub label: String,
    pub namespace: String,
}

/// What to select from an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub prefixes: Vec<Prefix>,
    pub graph: Option<String>,
    /// Triple pattern binding the shape, e.g. `?s geo:asWKT ?shape`.
    pub property: Option<String>,
    /// Additional pattern narrowing the subjects.
    pub restriction: Option<String>,
    /// Complete query text; when set, the other parts are ignored.
    pub rawquery: Option<String>,
    pub uri_var: String,
    pub shape_var: String,
}

/// A validated selection that can render paged queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    selection: Selection,
}

impl SelectQuery {
    pub fn new(selection: Selection) -> Result<Self> {
        for var in [&selection.uri_var, &selection.shape_var] {
            if !is_valid_var(var) {
                return Err(SparqlError::InvalidVariable(var.clone()));
            }
        }
        if selection.rawquery.is_none() {
            if selection.graph.as_deref().is_none_or(str::is_empty) {
                return Err(SparqlError::MissingField("graph"));
            }
            if selection.property.as_deref().is_none_or(str::is_empty) {
                return Err(SparqlError::MissingField("property"));
            }
        }
        Ok(Self { selection })
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn uri_var(&self) -> &str {
        &self.selection.uri_var
    }

    pub fn shape_var(&self) -> &str {
        &self.selection.shape_var
    }

    /// Query text for one page.
    pub fn build(&self, offset: u64, limit: Option<usize>) -> String {
        let s = &self.selection;
        let mut query = match &s.rawquery {
            Some(raw) => format!("{raw} OFFSET {offset}"),
            None => {
                let mut parts: Vec<String> = s
                    .prefixes
                    .iter()
                    .map(|p| format!("PREFIX {}: <{}>", p.label, p.namespace))
                    .collect();
                parts.push(format!("SELECT DISTINCT ?{} ?{}", s.uri_var, s.shape_var));
                if let Some(graph) = &s.graph {
                    parts.push(format!("FROM <{graph}>"));
                }
                parts.push(self.where_clause());
                parts.push(format!("OFFSET {offset}"));
                parts.join(" ")
            }
        };
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        query
    }

    fn where_clause(&self) -> String {
        let mut clause = String::from("WHERE {");
        for pattern in [&self.selection.restriction, &self.selection.property]
            .into_iter()
            .flatten()
        {
            clause.push_str(pattern);
            clause.push_str(" . ");
        }
        clause.push('}');
        clause
    }

    /// Whitespace- and brace-normalised text of the offset-0, unlimited query.
    pub fn canonical(&self) -> String {
        canonicalize_query(&self.build(0, None))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_query(&self.build(0, None))
    }
}

fn is_valid_var(var: &str) -> bool {
    !var.is_empty() && var.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> Selection {
        Selection {
            prefixes: vec![Prefix {
                label: "geo".into(),
                namespace: "http://www.opengis.net/ont/geosparql#".into(),
            }],
            graph: Some("http://example.org/graph".into()),
            property: Some("?s geo:hasGeometry/geo:asWKT ?shape".into()),
            restriction: Some("?s a <http://example.org/Municipality>".into()),
            rawquery: None,
            uri_var: "s".into(),
            shape_var: "shape".into(),
        }
    }

    #[test]
    fn test_build_structured_query() {
        let q = SelectQuery::new(selection()).unwrap();
        assert_eq!(
            q.build(2000, Some(1000)),
            "PREFIX geo: <http://www.opengis.net/ont/geosparql#> \
             SELECT DISTINCT ?s ?shape FROM <http://example.org/graph> \
             WHERE {?s a <http://example.org/Municipality> . ?s geo:hasGeometry/geo:asWKT ?shape . } \
             OFFSET 2000 LIMIT 1000"
        );
    }

    #[test]
    fn test_build_without_restriction_or_limit() {
        let mut sel = selection();
        sel.restriction = None;
        sel.prefixes.clear();
        let q = SelectQuery::new(sel).unwrap();
        assert_eq!(
            q.build(0, None),
            "SELECT DISTINCT ?s ?shape FROM <http://example.org/graph> \
             WHERE {?s geo:hasGeometry/geo:asWKT ?shape . } OFFSET 0"
        );
    }

    #[test]
    fn test_build_raw_query() {
        let sel = Selection {
            rawquery: Some("SELECT ?s ?shape WHERE { ?s <p> ?shape }".into()),
            uri_var: "s".into(),
            shape_var: "shape".into(),
            ..Selection::default()
        };
        let q = SelectQuery::new(sel).unwrap();
        assert_eq!(q.build(10, None), "SELECT ?s ?shape WHERE { ?s <p> ?shape } OFFSET 10");
        assert_eq!(
            q.build(10, Some(5)),
            "SELECT ?s ?shape WHERE { ?s <p> ?shape } OFFSET 10 LIMIT 5"
        );
    }

    #[test]
    fn test_canonical_form() {
        let q = SelectQuery::new(selection()).unwrap();
        let canonical = q.canonical();
        assert!(canonical.contains(" {?s a"));
        assert!(!canonical.contains("  "));
        assert!(canonical.ends_with("OFFSET 0"));
    }

    #[test]
    fn test_fingerprint_ignores_formatting() {
        let compact = Selection {
            rawquery: Some("SELECT ?s ?shape WHERE { ?s <p> ?shape }".into()),
            uri_var: "s".into(),
            shape_var: "shape".into(),
            ..Selection::default()
        };
        let spread = Selection {
            rawquery: Some("SELECT ?s ?shape\n  WHERE\t{\n    ?s <p> ?shape\n  }".into()),
            ..compact.clone()
        };
        let a = SelectQuery::new(compact).unwrap().fingerprint();
        let b = SelectQuery::new(spread).unwrap().fingerprint();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_depends_on_selection() {
        let a = SelectQuery::new(selection()).unwrap().fingerprint();
        let mut other = selection();
        other.graph = Some("http://example.org/other".into());
        let b = SelectQuery::new(other).unwrap().fingerprint();
        assert_ne!(a, b);
    }

    #[test]
    fn test_validation() {
        let mut sel = selection();
        sel.graph = None;
        assert!(matches!(
            SelectQuery::new(sel),
            Err(SparqlError::MissingField("graph"))
        ));

        let mut sel = selection();
        sel.property = Some(String::new());
        assert!(matches!(
            SelectQuery::new(sel),
            Err(SparqlError::MissingField("property"))
        ));

        let mut sel = selection();
        sel.uri_var = "s x".into();
        assert!(matches!(
            SelectQuery::new(sel),
            Err(SparqlError::InvalidVariable(_))
        ));
    }
}
