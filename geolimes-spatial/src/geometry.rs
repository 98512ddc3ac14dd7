//! Geometry parsing, validity and bounding boxes.
//!
//! WKT text is the stored form of every geometry; it is parsed here, once per
//! record per run, into `geo-types` values. Validity is checked structurally
//! (finite coordinates, minimum vertex counts, simple polygon rings) so that a
//! bad record can be reported and skipped instead of producing nonsense
//! predicate results.

use crate::error::{Result, SpatialError};
use geo::{BoundingRect, CoordsIter, Intersects};
use geo_types::{Geometry, Line, LineString, Polygon};
use rstar::AABB;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in the geometry's own coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    /// Create a new bounding box.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate box around a single coordinate.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Compute from a geo-types Geometry. `None` for empty geometries.
    pub fn from_geometry(geom: &Geometry<f64>) -> Option<Self> {
        let rect = geom.bounding_rect()?;
        Some(Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }

    /// Closed-interval overlap on both axes; touching boxes intersect.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// All four bounds are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// R-tree envelope for this box.
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

/// A parsed geometry together with the data matching needs from it.
#[derive(Debug, Clone)]
pub struct ParsedGeometry {
    pub geometry: Geometry<f64>,

    /// `None` for empty geometries.
    pub bbox: Option<BBox>,
}

impl ParsedGeometry {
    pub fn new(geometry: Geometry<f64>) -> Self {
        let bbox = BBox::from_geometry(&geometry);
        Self { geometry, bbox }
    }

    /// Region used to look up index candidates: the coordinate itself for a
    /// point, the bounding box for everything else.
    pub fn query_region(&self) -> Option<BBox> {
        match &self.geometry {
            Geometry::Point(p) => Some(BBox::point(p.x(), p.y())),
            _ => self.bbox,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bbox.is_none()
    }
}

/// Parse WKT string to geo-types Geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    wkt::Wkt::from_str(wkt.trim())
        .map_err(|e| SpatialError::WktParse(format!("{:?}", e)))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| SpatialError::WktParse(format!("{:?}", e)))
        })
}

/// Parse and validate in one step.
pub fn parse_valid(wkt: &str) -> Result<ParsedGeometry> {
    let geometry = parse_wkt(wkt)?;
    validate(&geometry)?;
    Ok(ParsedGeometry::new(geometry))
}

/// Structural validity check.
///
/// Rejects non-finite coordinates, linestrings with a single vertex, polygon
/// rings with fewer than four coordinates, and self-intersecting rings.
/// Empty geometries are valid.
pub fn validate(geom: &Geometry<f64>) -> Result<()> {
    if geom
        .coords_iter()
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err(SpatialError::InvalidGeometry("non-finite coordinate".into()));
    }

    match geom {
        Geometry::LineString(ls) => validate_linestring(ls),
        Geometry::MultiLineString(mls) => mls.0.iter().try_for_each(validate_linestring),
        Geometry::Polygon(poly) => validate_polygon(poly),
        Geometry::MultiPolygon(mp) => mp.0.iter().try_for_each(validate_polygon),
        Geometry::GeometryCollection(gc) => gc.0.iter().try_for_each(validate),
        _ => Ok(()),
    }
}

fn validate_linestring(ls: &LineString<f64>) -> Result<()> {
    if ls.0.len() == 1 {
        return Err(SpatialError::InvalidGeometry(
            "linestring has a single vertex".into(),
        ));
    }
    Ok(())
}

fn validate_polygon(poly: &Polygon<f64>) -> Result<()> {
    if poly.exterior().0.is_empty() {
        return Ok(());
    }
    std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .try_for_each(validate_ring)
}

fn validate_ring(ring: &LineString<f64>) -> Result<()> {
    if ring.0.len() < 4 {
        return Err(SpatialError::InvalidGeometry(format!(
            "ring has {} coordinates, at least 4 required",
            ring.0.len()
        )));
    }
    if ring_self_intersects(ring) {
        return Err(SpatialError::InvalidGeometry("self-intersecting ring".into()));
    }
    Ok(())
}

/// True when two non-adjacent edges of a closed ring touch or cross.
///
/// Edges are swept left to right by their lower x bound; an edge is only
/// tested against the edges that start before it ends.
fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let mut coords = ring.0.clone();
    coords.dedup();
    let edges: Vec<Line<f64>> = coords
        .windows(2)
        .map(|pair| Line::new(pair[0], pair[1]))
        .collect();
    let n = edges.len();
    if n < 3 {
        // Collapsed ring.
        return true;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x_span(&edges[a]).0.total_cmp(&x_span(&edges[b]).0));

    for (k, &i) in order.iter().enumerate() {
        let reach = x_span(&edges[i]).1;
        let overlapping = order[k + 1..]
            .iter()
            .take_while(|&&j| x_span(&edges[j]).0 <= reach);
        for &j in overlapping {
            let gap = i.abs_diff(j);
            if gap == 1 || gap == n - 1 {
                continue;
            }
            if edges[i].intersects(&edges[j]) {
                return true;
            }
        }
    }
    false
}

fn x_span(line: &Line<f64>) -> (f64, f64) {
    let (a, b) = (line.start.x, line.end.x);
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
