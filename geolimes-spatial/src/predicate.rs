//! Relation vocabulary and predicate evaluation.
//!
//! Every relation reads "source REL target". Topological relations are
//! answered from a single DE-9IM matrix per pair; metric relations compute a
//! distance and hold when it is strictly below the configured threshold.
//! Adding a relation means one enum variant plus one arm in
//! [`Relation::evaluator`].

use crate::error::{Result, SpatialError};
use geo::algorithm::relate::IntersectionMatrix;
use geo::{Distance, Euclidean, HausdorffDistance, Relate};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

/// A named relation between a source and a target geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Contains,
    ContainsProperly,
    CoveredBy,
    Covers,
    Crosses,
    Disjoint,
    Distance,
    Equals,
    HausdorffDistance,
    Intersects,
    Overlaps,
    Touches,
    Within,
}

/// How a relation is decided.
#[derive(Clone, Copy)]
pub enum Evaluator {
    /// Test on the pair's DE-9IM matrix.
    Matrix(fn(&IntersectionMatrix) -> bool),
    /// Distance function compared against the threshold.
    Metric(fn(&Geometry<f64>, &Geometry<f64>) -> f64),
}

impl Relation {
    pub const ALL: [Relation; 13] = [
        Relation::Contains,
        Relation::ContainsProperly,
        Relation::CoveredBy,
        Relation::Covers,
        Relation::Crosses,
        Relation::Disjoint,
        Relation::Distance,
        Relation::Equals,
        Relation::HausdorffDistance,
        Relation::Intersects,
        Relation::Overlaps,
        Relation::Touches,
        Relation::Within,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Relation::Contains => "contains",
            Relation::ContainsProperly => "contains_properly",
            Relation::CoveredBy => "covered_by",
            Relation::Covers => "covers",
            Relation::Crosses => "crosses",
            Relation::Disjoint => "disjoint",
            Relation::Distance => "distance",
            Relation::Equals => "equals",
            Relation::HausdorffDistance => "hausdorff_distance",
            Relation::Intersects => "intersects",
            Relation::Overlaps => "overlaps",
            Relation::Touches => "touches",
            Relation::Within => "within",
        }
    }

    pub fn evaluator(self) -> Evaluator {
        match self {
            Relation::Contains => Evaluator::Matrix(IntersectionMatrix::is_contains),
            Relation::ContainsProperly => {
                Evaluator::Matrix(|m| m.matches("T**FF*FF*").unwrap_or(false))
            }
            Relation::CoveredBy => Evaluator::Matrix(IntersectionMatrix::is_coveredby),
            Relation::Covers => Evaluator::Matrix(IntersectionMatrix::is_covers),
            Relation::Crosses => Evaluator::Matrix(IntersectionMatrix::is_crosses),
            Relation::Disjoint => Evaluator::Matrix(IntersectionMatrix::is_disjoint),
            Relation::Distance => Evaluator::Metric(|a, b| Euclidean.distance(a, b)),
            Relation::Equals => Evaluator::Matrix(IntersectionMatrix::is_equal_topo),
            Relation::HausdorffDistance => Evaluator::Metric(|a, b| a.hausdorff_distance(b)),
            Relation::Intersects => Evaluator::Matrix(IntersectionMatrix::is_intersects),
            Relation::Overlaps => Evaluator::Matrix(IntersectionMatrix::is_overlaps),
            Relation::Touches => Evaluator::Matrix(IntersectionMatrix::is_touches),
            Relation::Within => Evaluator::Matrix(IntersectionMatrix::is_within),
        }
    }

    /// Metric relations need a threshold.
    pub fn is_metric(self) -> bool {
        matches!(self.evaluator(), Evaluator::Metric(_))
    }

    /// Whether a bbox-intersection prefilter can miss true matches.
    /// Distances and disjointness hold for pairs whose boxes never meet.
    pub fn requires_full_scan(self) -> bool {
        self.is_metric() || self == Relation::Disjoint
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Relation {
    type Err = SpatialError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Relation::ALL
            .into_iter()
            .find(|r| r.name() == needle)
            .ok_or_else(|| SpatialError::UnknownRelation(s.to_string()))
    }
}

/// One relation that held for a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub relation: Relation,
    pub distance: Option<f64>,
}

/// The relations requested for a run, plus the distance threshold.
#[derive(Debug, Clone)]
pub struct PredicateSet {
    relations: Vec<Relation>,
    threshold: Option<f64>,
}

impl PredicateSet {
    /// Build a predicate set. Duplicates are removed; metric relations require
    /// a finite, positive threshold.
    pub fn new(relations: impl IntoIterator<Item = Relation>, threshold: Option<f64>) -> Result<Self> {
        let mut relations: Vec<Relation> = relations.into_iter().collect();
        relations.sort_unstable();
        relations.dedup();

        if relations.is_empty() {
            return Err(SpatialError::Config("at least one relation is required".into()));
        }
        if relations.iter().any(|r| r.is_metric()) {
            match threshold {
                Some(t) if t.is_finite() && t > 0.0 => {}
                Some(t) => {
                    return Err(SpatialError::Config(format!(
                        "distance threshold must be a positive number, got {t}"
                    )))
                }
                None => {
                    return Err(SpatialError::Config(
                        "distance relations require a threshold".into(),
                    ))
                }
            }
        }

        Ok(Self {
            relations,
            threshold,
        })
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// True when candidates cannot be pruned with the spatial index.
    pub fn needs_full_scan(&self) -> bool {
        self.relations.iter().any(|r| r.requires_full_scan())
    }

    /// Evaluate every relation for one pair.
    ///
    /// A panic inside the geometry library is caught and returned as `Err`
    /// with a description; the caller records it and moves on.
    pub fn evaluate(
        &self,
        source: &Geometry<f64>,
        target: &Geometry<f64>,
    ) -> std::result::Result<Vec<Hit>, String> {
        let mut hits = Vec::new();
        let mut matrix: Option<IntersectionMatrix> = None;

        for &relation in &self.relations {
            match relation.evaluator() {
                Evaluator::Matrix(test) => {
                    if matrix.is_none() {
                        matrix = Some(guarded(relation, || source.relate(target))?);
                    }
                    let Some(m) = matrix.as_ref() else {
                        continue;
                    };
                    if test(m) {
                        hits.push(Hit {
                            relation,
                            distance: None,
                        });
                    }
                }
                Evaluator::Metric(metric) => {
                    let Some(threshold) = self.threshold else {
                        continue;
                    };
                    let distance = guarded(relation, || metric(source, target))?;
                    if distance < threshold {
                        hits.push(Hit {
                            relation,
                            distance: Some(distance),
                        });
                    }
                }
            }
        }

        Ok(hits)
    }
}

fn guarded<T>(relation: Relation, op: impl FnOnce() -> T) -> std::result::Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(op)).map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("{relation} evaluation failed: {detail}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::parse_wkt;

    fn hits(set: &PredicateSet, a: &str, b: &str) -> Vec<Relation> {
        set.evaluate(&parse_wkt(a).unwrap(), &parse_wkt(b).unwrap())
            .unwrap()
            .into_iter()
            .map(|h| h.relation)
            .collect()
    }

    const SQUARE: &str = "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))";

    #[test]
    fn test_names_roundtrip() {
        for r in Relation::ALL {
            assert_eq!(r.name().parse::<Relation>().unwrap(), r);
        }
        assert!("nearby".parse::<Relation>().is_err());
        assert_eq!("  Within ".parse::<Relation>().unwrap(), Relation::Within);
    }

    #[test]
    fn test_point_within_polygon() {
        let set = PredicateSet::new(
            [Relation::Within, Relation::Contains, Relation::Intersects, Relation::Touches],
            None,
        )
        .unwrap();
        assert_eq!(
            hits(&set, "POINT(5 5)", SQUARE),
            vec![Relation::Intersects, Relation::Within]
        );
        assert_eq!(
            hits(&set, SQUARE, "POINT(5 5)"),
            vec![Relation::Contains, Relation::Intersects]
        );
    }

    #[test]
    fn test_touching_squares() {
        let set = PredicateSet::new(
            [Relation::Touches, Relation::Overlaps, Relation::Disjoint],
            None,
        )
        .unwrap();
        let neighbour = "POLYGON((10 0, 20 0, 20 10, 10 10, 10 0))";
        assert_eq!(hits(&set, SQUARE, neighbour), vec![Relation::Touches]);
        let far = "POLYGON((30 0, 40 0, 40 10, 30 10, 30 0))";
        assert_eq!(hits(&set, SQUARE, far), vec![Relation::Disjoint]);
    }

    #[test]
    fn test_contains_properly_excludes_boundary_contact() {
        let set = PredicateSet::new([Relation::ContainsProperly, Relation::Covers], None).unwrap();
        let inner = "POLYGON((2 2, 4 2, 4 4, 2 4, 2 2))";
        let edge = "POLYGON((0 2, 4 2, 4 4, 0 4, 0 2))";
        assert_eq!(
            hits(&set, SQUARE, inner),
            vec![Relation::ContainsProperly, Relation::Covers]
        );
        assert_eq!(hits(&set, SQUARE, edge), vec![Relation::Covers]);
    }

    #[test]
    fn test_distance_threshold_is_strict() {
        let set = PredicateSet::new([Relation::Distance], Some(10.0)).unwrap();
        let near = set
            .evaluate(&parse_wkt("POINT(0 0)").unwrap(), &parse_wkt("POINT(9.9 0)").unwrap())
            .unwrap();
        assert_eq!(near.len(), 1);
        assert!((near[0].distance.unwrap() - 9.9).abs() < 1e-9);

        let far = set
            .evaluate(&parse_wkt("POINT(0 0)").unwrap(), &parse_wkt("POINT(10.1 0)").unwrap())
            .unwrap();
        assert!(far.is_empty());
    }

    #[test]
    fn test_hausdorff_distance() {
        let set = PredicateSet::new([Relation::HausdorffDistance], Some(5.0)).unwrap();
        let a = "LINESTRING(0 0, 10 0)";
        let b = "LINESTRING(0 3, 10 3)";
        let found = set
            .evaluate(&parse_wkt(a).unwrap(), &parse_wkt(b).unwrap())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!((found[0].distance.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_requires_threshold() {
        assert!(PredicateSet::new([Relation::Distance], None).is_err());
        assert!(PredicateSet::new([Relation::Distance], Some(-1.0)).is_err());
        assert!(PredicateSet::new([Relation::Distance], Some(f64::NAN)).is_err());
        assert!(PredicateSet::new(Vec::<Relation>::new(), None).is_err());
    }

    #[test]
    fn test_full_scan_detection() {
        assert!(!PredicateSet::new([Relation::Within], None).unwrap().needs_full_scan());
        assert!(PredicateSet::new([Relation::Within, Relation::Disjoint], None)
            .unwrap()
            .needs_full_scan());
        assert!(PredicateSet::new([Relation::Distance], Some(1.0))
            .unwrap()
            .needs_full_scan());
    }

    #[test]
    fn test_duplicates_removed() {
        let set = PredicateSet::new([Relation::Within, Relation::Within], None).unwrap();
        assert_eq!(set.relations(), &[Relation::Within]);
    }
}
