//! Geometry object model and GML geometry codecs
//!
//! The model is deliberately small: packed coordinate arrays, the shapes
//! GML 2 and the GML 3 simple-features profile can express, and a
//! [`Geometry::Reference`] placeholder for `xlink:href` geometry properties
//! that may be resolved later in the session.

pub mod codec;
pub mod coords;
pub mod gml2;
pub mod gml3;

pub use codec::{GeometryCodec, GeometryOptions, GeometryReader, GeometryWriter};
pub use coords::CoordinateFormatter;

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::reference::GmlReference;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Packed coordinate tuples of a fixed dimension
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Points {
    dimension: usize,
    ordinates: Vec<f64>,
}

impl Points {
    /// Create an empty sequence
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ordinates: Vec::new(),
        }
    }

    /// Create from packed ordinates; the length must be a multiple of `dimension`
    pub fn from_ordinates(dimension: usize, ordinates: Vec<f64>) -> Result<Self> {
        if dimension == 0 || ordinates.len() % dimension != 0 {
            return Err(Error::Other(format!(
                "{} ordinates do not form tuples of dimension {}",
                ordinates.len(),
                dimension
            )));
        }
        Ok(Self {
            dimension,
            ordinates,
        })
    }

    /// Create from individual positions, which must share one dimension
    pub fn from_positions<P: AsRef<[f64]>>(positions: &[P]) -> Result<Self> {
        let dimension = positions.first().map(|p| p.as_ref().len()).unwrap_or(2);
        let mut points = Self::new(dimension);
        for position in positions {
            points.push(position.as_ref())?;
        }
        Ok(points)
    }

    /// Append a tuple
    pub fn push(&mut self, position: &[f64]) -> Result<()> {
        if position.len() != self.dimension {
            return Err(Error::Other(format!(
                "Position of dimension {} added to points of dimension {}",
                position.len(),
                self.dimension
            )));
        }
        self.ordinates.extend_from_slice(position);
        Ok(())
    }

    /// Coordinate dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of tuples
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.ordinates.len() / self.dimension
        }
    }

    /// True if there are no tuples
    pub fn is_empty(&self) -> bool {
        self.ordinates.is_empty()
    }

    /// Tuple at `index`
    pub fn get(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.dimension)?;
        self.ordinates.get(start..start + self.dimension)
    }

    /// Iterate over tuples
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.ordinates.chunks_exact(self.dimension.max(1))
    }

    /// Packed ordinates
    pub fn ordinates(&self) -> &[f64] {
        &self.ordinates
    }

    /// Append all tuples of `other`
    pub fn extend(&mut self, other: &Points) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            self.dimension = other.dimension;
        }
        if other.dimension != self.dimension {
            return Err(Error::Other(format!(
                "Cannot join points of dimension {} and {}",
                self.dimension, other.dimension
            )));
        }
        self.ordinates.extend_from_slice(&other.ordinates);
        Ok(())
    }

    fn approx_eq(&self, other: &Points, tolerance: f64) -> bool {
        self.dimension == other.dimension
            && self.ordinates.len() == other.ordinates.len()
            && ordinates_close(&self.ordinates, &other.ordinates, tolerance)
    }
}

fn ordinates_close(a: &[f64], b: &[f64], tolerance: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
}

/// A single position
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Object id
    pub id: Option<String>,
    /// Coordinate reference system
    pub crs: Option<Crs>,
    /// Ordinates
    pub coordinates: Vec<f64>,
}

impl Point {
    /// Create an anonymous point
    pub fn new(coordinates: Vec<f64>, crs: Option<Crs>) -> Self {
        Self {
            id: None,
            crs,
            coordinates,
        }
    }
}

/// Line string, also used for linear rings
#[derive(Debug, Clone, PartialEq)]
pub struct LineString {
    /// Object id
    pub id: Option<String>,
    /// Coordinate reference system
    pub crs: Option<Crs>,
    /// Control points
    pub points: Points,
}

/// Closed line string bounding a polygon
pub type LinearRing = LineString;

/// Curve made of line string segments
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    /// Object id
    pub id: Option<String>,
    /// Coordinate reference system
    pub crs: Option<Crs>,
    /// Segments in order
    pub segments: Vec<Points>,
}

impl Curve {
    /// All control points, joined segment after segment
    pub fn control_points(&self) -> Result<Points> {
        let mut joined = Points::new(self.segments.first().map(|s| s.dimension()).unwrap_or(2));
        for segment in &self.segments {
            let skip_first = joined
                .iter()
                .last()
                .zip(segment.get(0))
                .map(|(a, b)| a == b)
                .unwrap_or(false);
            if skip_first {
                let rest = Points::from_ordinates(
                    segment.dimension(),
                    segment.ordinates()[segment.dimension()..].to_vec(),
                )?;
                joined.extend(&rest)?;
            } else {
                joined.extend(segment)?;
            }
        }
        Ok(joined)
    }
}

/// Polygon with an optional exterior ring and any number of holes
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Object id
    pub id: Option<String>,
    /// Coordinate reference system
    pub crs: Option<Crs>,
    /// Outer boundary
    pub exterior: Option<LinearRing>,
    /// Holes
    pub interiors: Vec<LinearRing>,
}

/// Surface made of polygon patches
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    /// Object id
    pub id: Option<String>,
    /// Coordinate reference system
    pub crs: Option<Crs>,
    /// Patches in order
    pub patches: Vec<Polygon>,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Coordinate reference system
    pub crs: Option<Crs>,
    /// Lower corner
    pub lower: Vec<f64>,
    /// Upper corner
    pub upper: Vec<f64>,
}

impl Envelope {
    /// Smallest envelope containing both
    pub fn merge(&self, other: &Envelope) -> Envelope {
        let dimension = self.lower.len().min(other.lower.len());
        Envelope {
            crs: self.crs.clone().or_else(|| other.crs.clone()),
            lower: (0..dimension)
                .map(|i| self.lower[i].min(other.lower[i]))
                .collect(),
            upper: (0..dimension)
                .map(|i| self.upper[i].max(other.upper[i]))
                .collect(),
        }
    }

    fn from_points<'p>(points: impl Iterator<Item = &'p [f64]>, crs: Option<&Crs>) -> Option<Envelope> {
        let mut envelope: Option<Envelope> = None;
        for position in points {
            envelope = Some(match envelope {
                None => Envelope {
                    crs: crs.cloned(),
                    lower: position.to_vec(),
                    upper: position.to_vec(),
                },
                Some(mut env) => {
                    for (i, value) in position.iter().enumerate().take(env.lower.len()) {
                        env.lower[i] = env.lower[i].min(*value);
                        env.upper[i] = env.upper[i].max(*value);
                    }
                    env
                }
            });
        }
        envelope
    }
}

/// Aggregate flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    /// `MultiPoint`
    MultiPoint,
    /// `MultiLineString` (GML 2, 3.0, 3.1)
    MultiLineString,
    /// `MultiCurve`
    MultiCurve,
    /// `MultiPolygon` (GML 2, 3.0, 3.1)
    MultiPolygon,
    /// `MultiSurface`
    MultiSurface,
    /// heterogeneous `MultiGeometry`
    MultiGeometry,
}

/// Aggregate of member geometries
#[derive(Debug, Clone, PartialEq)]
pub struct MultiGeometry {
    /// Object id
    pub id: Option<String>,
    /// Coordinate reference system
    pub crs: Option<Crs>,
    /// Aggregate flavour
    pub kind: AggregateKind,
    /// Members in document order
    pub members: Vec<Geometry>,
}

/// Geometry property given as `xlink:href`
#[derive(Debug, Clone)]
pub struct GeometryReference {
    /// Shape the referring property expects
    pub kind: GeometryKind,
    /// The reference itself
    pub reference: GmlReference,
}

impl GeometryReference {
    /// The referenced geometry, once resolved
    pub fn resolved(&self) -> Option<Rc<Geometry>> {
        self.reference.geometry()
    }
}

impl PartialEq for GeometryReference {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.reference.uri() == other.reference.uri()
    }
}

/// Static geometry shape, used for dispatch and schema checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    /// Point
    Point,
    /// LineString
    LineString,
    /// LinearRing
    LinearRing,
    /// Curve (any curve when expected)
    Curve,
    /// Polygon
    Polygon,
    /// Surface (any surface when expected)
    Surface,
    /// Envelope / Box
    Envelope,
    /// MultiPoint
    MultiPoint,
    /// MultiLineString
    MultiLineString,
    /// MultiCurve
    MultiCurve,
    /// MultiPolygon
    MultiPolygon,
    /// MultiSurface
    MultiSurface,
    /// MultiGeometry
    MultiGeometry,
    /// Anything
    Any,
}

impl GeometryKind {
    /// Whether a geometry of kind `actual` satisfies this expected kind
    pub fn accepts(self, actual: GeometryKind) -> bool {
        use GeometryKind::*;
        match self {
            Any => true,
            Curve => matches!(actual, Curve | LineString | LinearRing),
            Surface => matches!(actual, Surface | Polygon),
            MultiCurve => matches!(actual, MultiCurve | MultiLineString),
            MultiSurface => matches!(actual, MultiSurface | MultiPolygon),
            MultiGeometry => matches!(
                actual,
                MultiGeometry | MultiPoint | MultiLineString | MultiCurve | MultiPolygon | MultiSurface
            ),
            expected => expected == actual || actual == Any,
        }
    }
}

impl From<AggregateKind> for GeometryKind {
    fn from(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::MultiPoint => GeometryKind::MultiPoint,
            AggregateKind::MultiLineString => GeometryKind::MultiLineString,
            AggregateKind::MultiCurve => GeometryKind::MultiCurve,
            AggregateKind::MultiPolygon => GeometryKind::MultiPolygon,
            AggregateKind::MultiSurface => GeometryKind::MultiSurface,
            AggregateKind::MultiGeometry => GeometryKind::MultiGeometry,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Any geometry
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Point
    Point(Point),
    /// LineString
    LineString(LineString),
    /// LinearRing
    LinearRing(LinearRing),
    /// Curve
    Curve(Curve),
    /// Polygon
    Polygon(Polygon),
    /// Surface
    Surface(Surface),
    /// Envelope
    Envelope(Envelope),
    /// Aggregate
    Multi(MultiGeometry),
    /// Reference placeholder
    Reference(GeometryReference),
}

impl Geometry {
    /// Object id
    pub fn id(&self) -> Option<&str> {
        match self {
            Geometry::Point(g) => g.id.as_deref(),
            Geometry::LineString(g) | Geometry::LinearRing(g) => g.id.as_deref(),
            Geometry::Curve(g) => g.id.as_deref(),
            Geometry::Polygon(g) => g.id.as_deref(),
            Geometry::Surface(g) => g.id.as_deref(),
            Geometry::Envelope(_) => None,
            Geometry::Multi(g) => g.id.as_deref(),
            Geometry::Reference(r) => r.reference.id(),
        }
    }

    /// Coordinate reference system
    pub fn crs(&self) -> Option<&Crs> {
        match self {
            Geometry::Point(g) => g.crs.as_ref(),
            Geometry::LineString(g) | Geometry::LinearRing(g) => g.crs.as_ref(),
            Geometry::Curve(g) => g.crs.as_ref(),
            Geometry::Polygon(g) => g.crs.as_ref(),
            Geometry::Surface(g) => g.crs.as_ref(),
            Geometry::Envelope(g) => g.crs.as_ref(),
            Geometry::Multi(g) => g.crs.as_ref(),
            Geometry::Reference(_) => None,
        }
    }

    /// Static shape
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::LinearRing(_) => GeometryKind::LinearRing,
            Geometry::Curve(_) => GeometryKind::Curve,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::Surface(_) => GeometryKind::Surface,
            Geometry::Envelope(_) => GeometryKind::Envelope,
            Geometry::Multi(g) => g.kind.into(),
            Geometry::Reference(r) => r.kind,
        }
    }

    /// True for unresolved or resolved reference placeholders
    pub fn is_reference(&self) -> bool {
        matches!(self, Geometry::Reference(_))
    }

    /// Bounding box, `None` for empty geometries and unresolved references
    pub fn envelope(&self) -> Option<Envelope> {
        let crs = self.crs();
        match self {
            Geometry::Point(p) => Some(Envelope {
                crs: crs.cloned(),
                lower: p.coordinates.clone(),
                upper: p.coordinates.clone(),
            }),
            Geometry::LineString(l) | Geometry::LinearRing(l) => {
                Envelope::from_points(l.points.iter(), crs)
            }
            Geometry::Curve(c) => {
                Envelope::from_points(c.segments.iter().flat_map(|s| s.iter()), crs)
            }
            Geometry::Polygon(p) => polygon_envelope(p, crs),
            Geometry::Surface(s) => s
                .patches
                .iter()
                .filter_map(|p| polygon_envelope(p, crs))
                .reduce(|a, b| a.merge(&b)),
            Geometry::Envelope(e) => Some(e.clone()),
            Geometry::Multi(m) => m
                .members
                .iter()
                .filter_map(|g| g.envelope())
                .reduce(|a, b| a.merge(&b))
                .map(|mut env| {
                    if crs.is_some() {
                        env.crs = crs.cloned();
                    }
                    env
                }),
            Geometry::Reference(r) => r.resolved().and_then(|g| g.envelope()),
        }
    }

    /// Structural equality with coordinates compared within `tolerance`
    pub fn approx_eq(&self, other: &Geometry, tolerance: f64) -> bool {
        if self.id() != other.id() || self.crs() != other.crs() {
            return false;
        }
        match (self, other) {
            (Geometry::Point(a), Geometry::Point(b)) => {
                ordinates_close(&a.coordinates, &b.coordinates, tolerance)
            }
            (Geometry::LineString(a), Geometry::LineString(b))
            | (Geometry::LinearRing(a), Geometry::LinearRing(b)) => {
                a.points.approx_eq(&b.points, tolerance)
            }
            (Geometry::Curve(a), Geometry::Curve(b)) => {
                a.segments.len() == b.segments.len()
                    && a.segments
                        .iter()
                        .zip(&b.segments)
                        .all(|(x, y)| x.approx_eq(y, tolerance))
            }
            (Geometry::Polygon(a), Geometry::Polygon(b)) => polygons_close(a, b, tolerance),
            (Geometry::Surface(a), Geometry::Surface(b)) => {
                a.patches.len() == b.patches.len()
                    && a.patches
                        .iter()
                        .zip(&b.patches)
                        .all(|(x, y)| polygons_close(x, y, tolerance))
            }
            (Geometry::Envelope(a), Geometry::Envelope(b)) => {
                ordinates_close(&a.lower, &b.lower, tolerance)
                    && ordinates_close(&a.upper, &b.upper, tolerance)
            }
            (Geometry::Multi(a), Geometry::Multi(b)) => {
                a.kind == b.kind
                    && a.members.len() == b.members.len()
                    && a.members
                        .iter()
                        .zip(&b.members)
                        .all(|(x, y)| x.approx_eq(y, tolerance))
            }
            (Geometry::Reference(a), Geometry::Reference(b)) => a == b,
            _ => false,
        }
    }

    /// Copy with the CRS replaced on this geometry and all nested parts
    pub fn with_crs(&self, crs: Option<Crs>) -> Geometry {
        let mut copy = self.clone();
        copy.set_crs(crs);
        copy
    }

    fn set_crs(&mut self, crs: Option<Crs>) {
        match self {
            Geometry::Point(g) => g.crs = crs,
            Geometry::LineString(g) | Geometry::LinearRing(g) => g.crs = crs,
            Geometry::Curve(g) => g.crs = crs,
            Geometry::Polygon(g) => set_polygon_crs(g, crs),
            Geometry::Surface(g) => {
                for patch in &mut g.patches {
                    set_polygon_crs(patch, crs.clone());
                }
                g.crs = crs;
            }
            Geometry::Envelope(g) => g.crs = crs,
            Geometry::Multi(g) => {
                for member in &mut g.members {
                    member.set_crs(crs.clone());
                }
                g.crs = crs;
            }
            Geometry::Reference(_) => {}
        }
    }
}

fn set_polygon_crs(polygon: &mut Polygon, crs: Option<Crs>) {
    if let Some(ring) = polygon.exterior.as_mut() {
        ring.crs = crs.clone();
    }
    for ring in &mut polygon.interiors {
        ring.crs = crs.clone();
    }
    polygon.crs = crs;
}

fn polygon_envelope(polygon: &Polygon, crs: Option<&Crs>) -> Option<Envelope> {
    polygon
        .exterior
        .as_ref()
        .and_then(|ring| Envelope::from_points(ring.points.iter(), crs))
}

fn polygons_close(a: &Polygon, b: &Polygon, tolerance: f64) -> bool {
    let exterior = match (&a.exterior, &b.exterior) {
        (Some(x), Some(y)) => x.points.approx_eq(&y.points, tolerance),
        (None, None) => true,
        _ => false,
    };
    exterior
        && a.interiors.len() == b.interiors.len()
        && a.interiors
            .iter()
            .zip(&b.interiors)
            .all(|(x, y)| x.points.approx_eq(&y.points, tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> LinearRing {
        LineString {
            id: None,
            crs: None,
            points: Points::from_positions(&[[0.0, 0.0], [4.0, 0.0], [4.0, 3.0], [0.0, 0.0]]).unwrap(),
        }
    }

    #[test]
    fn test_points_access() {
        let points = Points::from_ordinates(3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points.get(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(points.get(2), None);
        assert!(Points::from_ordinates(2, vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_push_dimension_mismatch() {
        let mut points = Points::new(2);
        assert!(points.push(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_polygon_envelope() {
        let polygon = Geometry::Polygon(Polygon {
            id: Some("A".to_string()),
            crs: Some(Crs::new("EPSG:4326")),
            exterior: Some(square()),
            interiors: vec![],
        });
        let env = polygon.envelope().unwrap();
        assert_eq!(env.lower, vec![0.0, 0.0]);
        assert_eq!(env.upper, vec![4.0, 3.0]);
        assert_eq!(env.crs, Some(Crs::new("EPSG:4326")));
    }

    #[test]
    fn test_approx_eq() {
        let a = Geometry::Point(Point::new(vec![10.0, 20.0], Some(Crs::new("EPSG:4326"))));
        let b = Geometry::Point(Point::new(vec![10.0004, 20.0], Some(Crs::new("EPSG:4326"))));
        assert!(a.approx_eq(&b, 0.001));
        assert!(!a.approx_eq(&b, 0.0001));
        assert!(!a.approx_eq(&b.with_crs(None), 0.001));
    }

    #[test]
    fn test_kind_acceptance() {
        assert!(GeometryKind::Curve.accepts(GeometryKind::LineString));
        assert!(GeometryKind::Surface.accepts(GeometryKind::Polygon));
        assert!(GeometryKind::MultiSurface.accepts(GeometryKind::MultiPolygon));
        assert!(GeometryKind::Any.accepts(GeometryKind::Envelope));
        assert!(!GeometryKind::Point.accepts(GeometryKind::Polygon));
    }

    #[test]
    fn test_curve_control_points() {
        let curve = Curve {
            id: None,
            crs: None,
            segments: vec![
                Points::from_positions(&[[0.0, 0.0], [1.0, 1.0]]).unwrap(),
                Points::from_positions(&[[1.0, 1.0], [2.0, 0.0]]).unwrap(),
            ],
        };
        assert_eq!(curve.control_points().unwrap().len(), 3);
    }
}
