//! Axis-aligned envelopes and envelope extraction.
//!
//! The envelope is the unit the whole index trades in: one per indexed
//! feature row, four per native-range shadow entry, one per query window.
//! Extraction prefers a precomputed envelope from the geometry encoding
//! header (O(1)); otherwise it recursively folds min/max over every
//! coordinate-bearing substructure of the decoded geometry.

use geo_types::{Coord, Geometry, LineString};
use serde::{Deserialize, Serialize};

/// Axis-aligned minimum bounding rectangle, with optional Z/M ranges.
///
/// Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,

    /// Optional elevation range `(min_z, max_z)`.
    pub z: Option<(f64, f64)>,

    /// Optional measure range `(min_m, max_m)`.
    pub m: Option<(f64, f64)>,
}

impl Envelope {
    /// Create a 2D envelope.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            z: None,
            m: None,
        }
    }

    /// Attach an elevation range.
    pub fn with_z(mut self, min_z: f64, max_z: f64) -> Self {
        self.z = Some((min_z, max_z));
        self
    }

    /// Attach a measure range.
    pub fn with_m(mut self, min_m: f64, max_m: f64) -> Self {
        self.m = Some((min_m, max_m));
        self
    }

    /// Inclusive intersection test within tolerance.
    ///
    /// Each axis's ranges must overlap; `tolerance` widens the comparison
    /// so boundary-touching envelopes intersect despite floating-point
    /// error. Z/M ranges do not participate.
    pub fn intersects(&self, other: &Envelope, tolerance: f64) -> bool {
        self.min_x <= other.max_x + tolerance
            && other.min_x <= self.max_x + tolerance
            && self.min_y <= other.max_y + tolerance
            && other.min_y <= self.max_y + tolerance
    }

    /// The envelope grown by `tolerance` on every side.
    pub fn expanded(&self, tolerance: f64) -> Self {
        Self {
            min_x: self.min_x - tolerance,
            min_y: self.min_y - tolerance,
            max_x: self.max_x + tolerance,
            max_y: self.max_y + tolerance,
            z: self.z,
            m: self.m,
        }
    }

    /// Smallest envelope containing both.
    pub fn union(&self, other: &Envelope) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
            z: merge_range(self.z, other.z),
            m: merge_range(self.m, other.m),
        }
    }

    fn from_coord(c: Coord<f64>) -> Self {
        Self::new(c.x, c.y, c.x, c.y)
    }

    /// Recursively compute the envelope of a decoded geometry.
    ///
    /// Empty geometries (and collections whose members are all empty)
    /// yield `None` — they are not indexable.
    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(p) => Some(Self::from_coord(p.0)),
            Geometry::Line(l) => {
                Some(Self::from_coord(l.start).union(&Self::from_coord(l.end)))
            }
            Geometry::LineString(ls) => Self::from_line_string(ls),
            Geometry::Polygon(p) => Self::from_polygon(p),
            Geometry::MultiPoint(mp) => {
                fold(mp.0.iter().map(|p| Some(Self::from_coord(p.0))))
            }
            Geometry::MultiLineString(mls) => {
                fold(mls.0.iter().map(Self::from_line_string))
            }
            Geometry::MultiPolygon(mp) => fold(mp.0.iter().map(Self::from_polygon)),
            Geometry::GeometryCollection(gc) => fold(gc.0.iter().map(Self::from_geometry)),
            Geometry::Rect(r) => Some(Self::new(r.min().x, r.min().y, r.max().x, r.max().y)),
            Geometry::Triangle(t) => Some(
                Self::from_coord(t.0)
                    .union(&Self::from_coord(t.1))
                    .union(&Self::from_coord(t.2)),
            ),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    fn from_line_string(ls: &LineString<f64>) -> Option<Self> {
        fold(ls.0.iter().map(|c| Some(Self::from_coord(*c))))
    }

    fn from_polygon(p: &geo_types::Polygon<f64>) -> Option<Self> {
        let mut env = Self::from_line_string(p.exterior())?;
        for ring in p.interiors() {
            if let Some(e) = Self::from_line_string(ring) {
                env = env.union(&e);
            }
        }
        Some(env)
    }
}

fn fold(envelopes: impl Iterator<Item = Option<Envelope>>) -> Option<Envelope> {
    envelopes
        .flatten()
        .reduce(|acc, e| acc.union(&e))
}

fn merge_range(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
        (Some(r), None) | (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon, GeometryCollection, MultiPoint};

    #[test]
    fn test_point_envelope() {
        let env = Envelope::from_geometry(&point!(x: 8.38, y: 6.83).into()).unwrap();
        assert_eq!(env, Envelope::new(8.38, 6.83, 8.38, 6.83));
    }

    #[test]
    fn test_polygon_envelope_includes_interior_rings() {
        let poly = polygon!(
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 20.0),
                (x: 0.0, y: 20.0),
            ],
            interiors: [[
                (x: 2.0, y: 2.0),
                (x: 4.0, y: 2.0),
                (x: 4.0, y: 4.0),
                (x: 2.0, y: 4.0),
            ]],
        );
        let env = Envelope::from_geometry(&poly.into()).unwrap();
        assert_eq!(env, Envelope::new(0.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn test_collection_envelope_recurses() {
        let gc = GeometryCollection(vec![
            Geometry::Point(point!(x: -3.0, y: 1.0)),
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 7.0)]),
        ]);
        let env = Envelope::from_geometry(&Geometry::GeometryCollection(gc)).unwrap();
        assert_eq!(env, Envelope::new(-3.0, 0.0, 5.0, 7.0));
    }

    #[test]
    fn test_empty_geometries_are_not_indexable() {
        let empty_line = Geometry::LineString(LineString::<f64>(vec![]));
        assert!(Envelope::from_geometry(&empty_line).is_none());

        let empty_multi = Geometry::MultiPoint(MultiPoint::<f64>(vec![]));
        assert!(Envelope::from_geometry(&empty_multi).is_none());

        let empty_collection = Geometry::GeometryCollection(GeometryCollection::<f64>(vec![]));
        assert!(Envelope::from_geometry(&empty_collection).is_none());
    }

    #[test]
    fn test_boundary_touch_intersects_within_tolerance() {
        let point = Envelope::new(8.38, 6.83, 8.38, 6.83);
        let window = Envelope::new(5.89, 6.83, 8.38, 9.13);
        assert!(point.intersects(&window, DEFAULT_EPS));
        assert!(window.intersects(&point, DEFAULT_EPS));

        let far = Envelope::new(0.0, 0.0, 1.0, 1.0);
        assert!(!point.intersects(&far, DEFAULT_EPS));
    }

    #[test]
    fn test_tolerance_absorbs_float_error() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let b = Envelope::new(1.0 + 1e-15, 0.0, 2.0, 1.0);
        assert!(a.intersects(&b, DEFAULT_EPS));
        assert!(!a.intersects(&b, 0.0));
    }

    #[test]
    fn test_union_merges_optional_ranges() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0).with_z(5.0, 9.0);
        let b = Envelope::new(-1.0, 0.0, 0.5, 2.0).with_z(1.0, 6.0);
        let u = a.union(&b);
        assert_eq!(u.min_x, -1.0);
        assert_eq!(u.max_y, 2.0);
        assert_eq!(u.z, Some((1.0, 9.0)));
        assert_eq!(u.m, None);
    }

    const DEFAULT_EPS: f64 = crate::config::DEFAULT_TOLERANCE;
}
