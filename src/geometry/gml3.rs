//! GML 3.0 / 3.1 / 3.2 geometry codec
//!
//! Covers the simple-features subset: points, line strings, linear rings,
//! curves of line string segments, polygons, surfaces of polygon patches,
//! envelopes and the multi geometries. Other GML 3 geometry elements are
//! recognised and rejected as unsupported.

use super::codec::{
    check_member_kind, coordinate_syntax, parse_coord, property_reference, read_coord, read_id, register_nested,
    resolve_crs, write_member_stub, write_srs_name, GeometryOptions, GeometryReader, GeometryWriter,
};
use super::coords::{parse_coordinates, parse_pos, parse_pos_list};
use super::{
    AggregateKind, Curve, Envelope, Geometry, GeometryKind, LineString, LinearRing, MultiGeometry,
    Point, Points, Polygon, Surface,
};
use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::namespaces::QName;
use crate::reference::DocumentIdContext;
use crate::version::GmlVersion;
use crate::xml::{XmlCursor, XmlEmitter};

const SUPPORTED: &[&str] = &[
    "Point",
    "LineString",
    "LinearRing",
    "Curve",
    "Polygon",
    "Surface",
    "Envelope",
    "MultiPoint",
    "MultiLineString",
    "MultiCurve",
    "MultiPolygon",
    "MultiSurface",
    "MultiGeometry",
];

const UNSUPPORTED: &[&str] = &[
    "CompositeCurve",
    "OrientableCurve",
    "Ring",
    "CompositeSurface",
    "OrientableSurface",
    "PolyhedralSurface",
    "TriangulatedSurface",
    "Tin",
    "Solid",
    "CompositeSolid",
    "MultiSolid",
    "CompositeGeometry",
    "GeometricComplex",
    "Grid",
    "RectifiedGrid",
];

const STANDARD_PROPERTIES: &[&str] = &[
    "metaDataProperty",
    "description",
    "descriptionReference",
    "identifier",
    "name",
];

struct Header {
    id: Option<String>,
    crs: Option<Crs>,
    dimension: Option<usize>,
}

/// GML 3.x geometry reader and writer
#[derive(Debug, Clone)]
pub struct Gml3Codec {
    version: GmlVersion,
    options: GeometryOptions,
}

impl Gml3Codec {
    /// Create a codec for one of the GML 3 versions
    pub fn new(version: GmlVersion, options: GeometryOptions) -> Self {
        Self { version, options }
    }

    /// Settings in use
    pub fn options(&self) -> &GeometryOptions {
        &self.options
    }

    fn ns(&self) -> &'static str {
        self.version.namespace()
    }

    fn header(
        &self,
        cursor: &XmlCursor<'_>,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Header> {
        Ok(Header {
            id: read_id(cursor, cursor.attribute_ns(self.ns(), "id"), self.options.lax)?,
            crs: resolve_crs(cursor, &self.options, crs)?,
            dimension: dimension_attribute(cursor)?.or(dimension),
        })
    }

    // next child element, skipping the standard object properties
    fn next_child(&self, cursor: &mut XmlCursor<'_>) -> Result<Option<QName>> {
        loop {
            cursor.next_tag()?;
            if cursor.is_end() {
                return Ok(None);
            }
            let name = cursor.require_start()?.clone();
            if name.in_namespace(self.ns()) && STANDARD_PROPERTIES.contains(&name.local_name.as_str()) {
                cursor.skip_element()?;
                continue;
            }
            return Ok(Some(name));
        }
    }

    fn unexpected(&self, cursor: &XmlCursor<'_>, parent: &QName, child: &QName) -> Error {
        cursor.parse_error(format!(
            "Error in 'gml:{}' element. Unexpected child element '{}'.",
            parent.local_name, child
        ))
    }

    fn parse_geometry(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Geometry> {
        let name = cursor.require_start()?.clone();
        if !name.in_namespace(self.ns()) {
            return Err(cursor.parse_error(format!(
                "Unexpected element '{}'. Expected a GML {} geometry element.",
                name, self.version
            )));
        }
        let pre_32 = self.version.is_pre_32();
        let local = name.local_name.as_str();
        match local {
            "Point" => self.parse_point(cursor, crs, dimension).map(Geometry::Point),
            "LineString" => self
                .parse_line_string(cursor, ids, crs, dimension, 2)
                .map(Geometry::LineString),
            "LinearRing" => self
                .parse_line_string(cursor, ids, crs, dimension, 4)
                .map(Geometry::LinearRing),
            "Curve" => self.parse_curve(cursor, ids, crs, dimension).map(Geometry::Curve),
            "Polygon" => self.parse_polygon(cursor, ids, crs, dimension).map(Geometry::Polygon),
            "Surface" => self.parse_surface(cursor, ids, crs, dimension).map(Geometry::Surface),
            "Envelope" => self.parse_envelope_element(cursor, crs, dimension).map(Geometry::Envelope),
            "MultiPoint" => self
                .parse_multi(cursor, ids, crs, dimension, AggregateKind::MultiPoint)
                .map(Geometry::Multi),
            "MultiLineString" if pre_32 => self
                .parse_multi(cursor, ids, crs, dimension, AggregateKind::MultiLineString)
                .map(Geometry::Multi),
            "MultiCurve" => self
                .parse_multi(cursor, ids, crs, dimension, AggregateKind::MultiCurve)
                .map(Geometry::Multi),
            "MultiPolygon" if pre_32 => self
                .parse_multi(cursor, ids, crs, dimension, AggregateKind::MultiPolygon)
                .map(Geometry::Multi),
            "MultiSurface" => self
                .parse_multi(cursor, ids, crs, dimension, AggregateKind::MultiSurface)
                .map(Geometry::Multi),
            "MultiGeometry" => self
                .parse_multi(cursor, ids, crs, dimension, AggregateKind::MultiGeometry)
                .map(Geometry::Multi),
            other if UNSUPPORTED.contains(&other) => Err(Error::Unsupported(format!(
                "Geometry element 'gml:{}' is not supported",
                other
            ))),
            other => Err(cursor.parse_error(format!(
                "Element 'gml:{}' is not a GML {} geometry element.",
                other, self.version
            ))),
        }
    }

    fn parse_point(
        &self,
        cursor: &mut XmlCursor<'_>,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Point> {
        match self.parse_point_tuple(cursor, crs, dimension)? {
            Some(point) => Ok(point),
            None => Err(cursor.parse_error("Error in 'gml:Point' element. No valid position.")),
        }
    }

    // `None` when lax mode dropped the only position of the point
    fn parse_point_tuple(
        &self,
        cursor: &mut XmlCursor<'_>,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Option<Point>> {
        let name = cursor.require_start()?.clone();
        let header = self.header(cursor, crs, dimension)?;
        let pre_32 = self.version.is_pre_32();

        let Some(child) = self.next_child(cursor)? else {
            return Err(cursor.parse_error(
                "Error in 'gml:Point' element. Expected a 'gml:pos' child element.",
            ));
        };
        let coordinates = match child.local_name.as_str() {
            "pos" if child.in_namespace(self.ns()) => self.read_tuple(cursor, header.dimension)?,
            "coordinates" if pre_32 && child.in_namespace(self.ns()) => {
                let points = self.read_coordinates(cursor)?;
                if points.len() != 1 {
                    return Err(cursor.parse_error(format!(
                        "Error in 'gml:Point' element. Expected exactly one coordinate tuple, found {}.",
                        points.len()
                    )));
                }
                Some(points.ordinates().to_vec())
            }
            "coord" if pre_32 && child.in_namespace(self.ns()) => read_coord(cursor, self.ns(), self.options.lax)?,
            _ => return Err(self.unexpected(cursor, &name, &child)),
        };
        if let Some(extra) = self.next_child(cursor)? {
            return Err(self.unexpected(cursor, &name, &extra));
        }
        cursor.require_end(&name)?;

        Ok(coordinates.map(|coordinates| Point {
            id: header.id,
            crs: header.crs,
            coordinates,
        }))
    }

    fn read_pos(&self, cursor: &mut XmlCursor<'_>, dimension: Option<usize>) -> Result<Vec<f64>> {
        let dimension = dimension_attribute(cursor)?.or(dimension);
        let text = cursor.element_text()?;
        parse_pos(&text, dimension).map_err(|e| cursor.locate(e))
    }

    // gml:pos inside a point sequence; lax mode drops a malformed tuple
    fn read_tuple(&self, cursor: &mut XmlCursor<'_>, dimension: Option<usize>) -> Result<Option<Vec<f64>>> {
        let dimension = dimension_attribute(cursor)?.or(dimension);
        let text = cursor.element_text()?;
        match parse_pos(&text, dimension) {
            Ok(position) => Ok(Some(position)),
            Err(err) if self.options.lax => {
                tracing::warn!(tuple = %text, error = %err, "skipping malformed coordinate tuple");
                Ok(None)
            }
            Err(err) => Err(cursor.locate(err)),
        }
    }

    fn read_coordinates(&self, cursor: &mut XmlCursor<'_>) -> Result<Points> {
        let syntax = coordinate_syntax(cursor);
        let text = cursor.element_text()?;
        parse_coordinates(&text, &syntax, self.options.lax, &self.options.limits).map_err(|e| cursor.locate(e))
    }

    fn read_pos_list(&self, cursor: &mut XmlCursor<'_>, dimension: Option<usize>) -> Result<Points> {
        let dimension = dimension_attribute(cursor)?
            .or(dimension)
            .or(self.options.default_dimension)
            .unwrap_or(2);
        let text = cursor.element_text()?;
        parse_pos_list(&text, dimension, self.options.lax, &self.options.limits).map_err(|e| cursor.locate(e))
    }

    // pos, pointProperty, posList, coordinates ... up to the parent's end tag
    fn parse_points(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        parent: &QName,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Points> {
        let mut points: Option<Points> = None;
        let pre_32 = self.version.is_pre_32();

        while let Some(child) = self.next_child(cursor)? {
            if !child.in_namespace(self.ns()) {
                return Err(self.unexpected(cursor, parent, &child));
            }
            match child.local_name.as_str() {
                "pos" => {
                    if let Some(position) = self.read_tuple(cursor, dimension)? {
                        push_position(cursor, &mut points, &position)?;
                    }
                }
                "pointProperty" | "pointRep" => {
                    if let Some(position) = self.parse_point_property(cursor, ids, crs, dimension)? {
                        push_position(cursor, &mut points, &position)?;
                    }
                }
                "coord" if pre_32 => {
                    if let Some(position) = read_coord(cursor, self.ns(), self.options.lax)? {
                        push_position(cursor, &mut points, &position)?;
                    }
                }
                "posList" => {
                    let parsed = self.read_pos_list(cursor, dimension)?;
                    extend_points(cursor, &mut points, &parsed)?;
                }
                "coordinates" => {
                    let parsed = self.read_coordinates(cursor)?;
                    extend_points(cursor, &mut points, &parsed)?;
                }
                _ => return Err(self.unexpected(cursor, parent, &child)),
            }
        }
        Ok(points.unwrap_or_else(|| Points::new(dimension.unwrap_or(2))))
    }

    fn parse_point_property(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Option<Vec<f64>>> {
        let property = cursor.require_start()?.clone();
        if let Some(Geometry::Reference(reference)) = property_reference(cursor, ids, GeometryKind::Point)? {
            return match reference.resolved().as_deref() {
                Some(Geometry::Point(point)) => Ok(Some(point.coordinates.clone())),
                _ => Err(Error::Unsupported(format!(
                    "Point reference '{}' must refer to a point defined earlier in the document",
                    reference.reference.uri()
                ))),
            };
        }
        cursor.next_tag()?;
        let point_name = cursor.require_start()?.clone();
        if !point_name.is(self.ns(), "Point") {
            return Err(self.unexpected(cursor, &property, &point_name));
        }
        let point = self.parse_point_tuple(cursor, crs, dimension)?;
        let coordinates = match point {
            Some(point) => {
                let coordinates = point.coordinates.clone();
                register_nested(ids, &Geometry::Point(point))?;
                Some(coordinates)
            }
            None => None,
        };
        cursor.next_tag()?;
        cursor.require_end(&property)?;
        Ok(coordinates)
    }

    fn parse_line_string(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
        dimension: Option<usize>,
        min_points: usize,
    ) -> Result<LineString> {
        let name = cursor.require_start()?.clone();
        let header = self.header(cursor, crs, dimension)?;
        let points = self.parse_points(cursor, ids, &name, header.crs.as_ref(), header.dimension)?;
        self.check_point_count(cursor, &name, &points, min_points)?;
        cursor.require_end(&name)?;
        Ok(LineString {
            id: header.id,
            crs: header.crs,
            points,
        })
    }

    fn check_point_count(
        &self,
        cursor: &XmlCursor<'_>,
        name: &QName,
        points: &Points,
        min_points: usize,
    ) -> Result<()> {
        if points.len() >= min_points {
            return Ok(());
        }
        let msg = format!(
            "Error in 'gml:{}' element. Must consist of {} points at least.",
            name.local_name, min_points
        );
        if self.options.lax && !points.is_empty() {
            tracing::warn!("{}", msg);
            return Ok(());
        }
        Err(cursor.parse_error(msg))
    }

    fn parse_curve(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Curve> {
        let name = cursor.require_start()?.clone();
        let header = self.header(cursor, crs, dimension)?;
        let mut segments = Vec::new();

        while let Some(child) = self.next_child(cursor)? {
            if !child.is(self.ns(), "segments") {
                return Err(self.unexpected(cursor, &name, &child));
            }
            while let Some(segment) = self.next_child(cursor)? {
                if !segment.is(self.ns(), "LineStringSegment") {
                    return Err(Error::Unsupported(format!(
                        "Curve segment '{}' is not supported",
                        segment
                    )));
                }
                let segment_dimension = dimension_attribute(cursor)?.or(header.dimension);
                let points =
                    self.parse_points(cursor, ids, &segment, header.crs.as_ref(), segment_dimension)?;
                self.check_point_count(cursor, &segment, &points, 2)?;
                cursor.require_end(&segment)?;
                segments.push(points);
            }
            cursor.require_end(&child)?;
        }
        if segments.is_empty() {
            return Err(cursor.parse_error("Error in 'gml:Curve' element. Expected at least one segment."));
        }
        cursor.require_end(&name)?;

        Ok(Curve {
            id: header.id,
            crs: header.crs,
            segments,
        })
    }

    fn parse_ring_property(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        property: &QName,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<LinearRing> {
        let Some(ring) = self.next_child(cursor)? else {
            return Err(cursor.parse_error(format!(
                "Error in 'gml:{}' element. Expected a 'gml:LinearRing'.",
                property.local_name
            )));
        };
        if ring.is(self.ns(), "Ring") {
            return Err(Error::Unsupported("Ring elements are not supported".to_string()));
        }
        if !ring.is(self.ns(), "LinearRing") {
            return Err(self.unexpected(cursor, property, &ring));
        }
        let parsed = self.parse_line_string(cursor, ids, crs, dimension, 4)?;
        if let Some(extra) = self.next_child(cursor)? {
            return Err(self.unexpected(cursor, property, &extra));
        }
        cursor.require_end(property)?;
        Ok(parsed)
    }

    // exterior / interior rings up to the polygon's (or patch's) end tag
    fn parse_rings(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        parent: &QName,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<(Option<LinearRing>, Vec<LinearRing>)> {
        let pre_32 = self.version.is_pre_32();
        let mut exterior = None;
        let mut interiors = Vec::new();

        while let Some(child) = self.next_child(cursor)? {
            if !child.in_namespace(self.ns()) {
                return Err(self.unexpected(cursor, parent, &child));
            }
            match child.local_name.as_str() {
                "exterior" => exterior = Some(self.parse_ring_property(cursor, ids, &child, crs, dimension)?),
                "outerBoundaryIs" if pre_32 => {
                    exterior = Some(self.parse_ring_property(cursor, ids, &child, crs, dimension)?)
                }
                "interior" => interiors.push(self.parse_ring_property(cursor, ids, &child, crs, dimension)?),
                "innerBoundaryIs" if pre_32 => {
                    interiors.push(self.parse_ring_property(cursor, ids, &child, crs, dimension)?)
                }
                _ => return Err(self.unexpected(cursor, parent, &child)),
            }
        }
        Ok((exterior, interiors))
    }

    fn parse_polygon(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Polygon> {
        let name = cursor.require_start()?.clone();
        let header = self.header(cursor, crs, dimension)?;
        let (exterior, interiors) =
            self.parse_rings(cursor, ids, &name, header.crs.as_ref(), header.dimension)?;
        cursor.require_end(&name)?;
        Ok(Polygon {
            id: header.id,
            crs: header.crs,
            exterior,
            interiors,
        })
    }

    fn parse_surface(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Surface> {
        let name = cursor.require_start()?.clone();
        let header = self.header(cursor, crs, dimension)?;
        let mut patches = Vec::new();

        while let Some(child) = self.next_child(cursor)? {
            if !(child.is(self.ns(), "patches") || child.is(self.ns(), "polygonPatches")) {
                return Err(self.unexpected(cursor, &name, &child));
            }
            while let Some(patch) = self.next_child(cursor)? {
                if !patch.is(self.ns(), "PolygonPatch") {
                    return Err(Error::Unsupported(format!(
                        "Surface patch '{}' is not supported",
                        patch
                    )));
                }
                let (exterior, interiors) =
                    self.parse_rings(cursor, ids, &patch, header.crs.as_ref(), header.dimension)?;
                cursor.require_end(&patch)?;
                patches.push(Polygon {
                    id: None,
                    crs: header.crs.clone(),
                    exterior,
                    interiors,
                });
            }
            cursor.require_end(&child)?;
        }
        cursor.require_end(&name)?;

        Ok(Surface {
            id: header.id,
            crs: header.crs,
            patches,
        })
    }

    fn parse_envelope_element(
        &self,
        cursor: &mut XmlCursor<'_>,
        crs: Option<&Crs>,
        dimension: Option<usize>,
    ) -> Result<Envelope> {
        let name = cursor.require_start()?.clone();
        let crs = resolve_crs(cursor, &self.options, crs)?;
        let dimension = dimension_attribute(cursor)?.or(dimension);
        let mut corners: Vec<Vec<f64>> = Vec::with_capacity(2);

        while let Some(child) = self.next_child(cursor)? {
            if !child.in_namespace(self.ns()) {
                return Err(self.unexpected(cursor, &name, &child));
            }
            match child.local_name.as_str() {
                "lowerCorner" | "upperCorner" | "pos" => corners.push(self.read_pos(cursor, dimension)?),
                "coordinates" => {
                    let points = self.read_coordinates(cursor)?;
                    corners.extend(points.iter().map(<[f64]>::to_vec));
                }
                "coord" => corners.push(parse_coord(cursor, self.ns())?),
                _ => return Err(self.unexpected(cursor, &name, &child)),
            }
        }
        cursor.require_end(&name)?;

        match <[Vec<f64>; 2]>::try_from(corners) {
            Ok([lower, upper]) if lower.len() == upper.len() => Ok(Envelope { crs, lower, upper }),
            _ => Err(cursor.parse_error(
                "Error in 'gml:Envelope' element. Expected a lower and an upper corner of the same dimension.",
            )),
        }
    }

    fn member_properties(&self, kind: AggregateKind) -> (&'static str, Option<&'static str>, GeometryKind) {
        match kind {
            AggregateKind::MultiPoint => ("pointMember", Some("pointMembers"), GeometryKind::Point),
            AggregateKind::MultiLineString => ("lineStringMember", None, GeometryKind::LineString),
            AggregateKind::MultiCurve => ("curveMember", Some("curveMembers"), GeometryKind::Curve),
            AggregateKind::MultiPolygon => ("polygonMember", None, GeometryKind::Polygon),
            AggregateKind::MultiSurface => ("surfaceMember", Some("surfaceMembers"), GeometryKind::Surface),
            AggregateKind::MultiGeometry => ("geometryMember", Some("geometryMembers"), GeometryKind::Any),
        }
    }

    fn parse_multi(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
        dimension: Option<usize>,
        kind: AggregateKind,
    ) -> Result<MultiGeometry> {
        let name = cursor.require_start()?.clone();
        let header = self.header(cursor, crs, dimension)?;
        let (member, array, member_kind) = self.member_properties(kind);
        let mut members = Vec::new();

        while let Some(child) = self.next_child(cursor)? {
            if child.is(self.ns(), member) {
                if let Some(reference) = property_reference(cursor, ids, member_kind)? {
                    members.push(reference);
                    continue;
                }
                cursor.next_tag()?;
                let geometry = self.parse_member(cursor, ids, &header, member_kind)?;
                members.push(geometry);
                cursor.next_tag()?;
                cursor.require_end(&child)?;
            } else if array.map(|a| child.is(self.ns(), a)).unwrap_or(false) {
                loop {
                    cursor.next_tag()?;
                    if cursor.is_end() {
                        break;
                    }
                    let geometry = self.parse_member(cursor, ids, &header, member_kind)?;
                    members.push(geometry);
                }
                cursor.require_end(&child)?;
            } else {
                return Err(self.unexpected(cursor, &name, &child));
            }
        }
        cursor.require_end(&name)?;

        Ok(MultiGeometry {
            id: header.id,
            crs: header.crs,
            kind,
            members,
        })
    }

    fn parse_member(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        header: &Header,
        expected: GeometryKind,
    ) -> Result<Geometry> {
        let geometry = self.parse_geometry(cursor, ids, header.crs.as_ref(), header.dimension)?;
        check_member_kind(cursor, expected, &geometry, self.options.lax)?;
        register_nested(ids, &geometry)?;
        Ok(geometry)
    }

    fn start(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        local_name: &str,
        id: Option<&str>,
        crs: Option<&Crs>,
        inherited: Option<&Crs>,
    ) -> Result<()> {
        emitter.start_element(Some(self.ns()), local_name)?;
        if let Some(id) = id {
            emitter.attribute(Some(self.ns()), "id", id)?;
            ids.mark_exported(id);
        }
        write_srs_name(emitter, crs, inherited)
    }

    fn write_pos(&self, emitter: &mut XmlEmitter<'_>, local_name: &str, position: &[f64]) -> Result<()> {
        let text = self.options.formatter.format_tuple(position, " ");
        emitter.text_element(Some(self.ns()), local_name, &text)
    }

    fn write_points(&self, emitter: &mut XmlEmitter<'_>, points: &Points) -> Result<()> {
        if self.version == GmlVersion::Gml30 {
            for position in points.iter() {
                self.write_pos(emitter, "pos", position)?;
            }
            return Ok(());
        }
        emitter.start_element(Some(self.ns()), "posList")?;
        if points.dimension() != 2 {
            emitter.attribute(None, "srsDimension", &points.dimension().to_string())?;
        }
        emitter.characters(&self.options.formatter.format_pos_list(points))?;
        emitter.end_element()
    }

    fn write_line(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        local_name: &str,
        line: &LineString,
        inherited: Option<&Crs>,
    ) -> Result<()> {
        self.start(emitter, ids, local_name, line.id.as_deref(), line.crs.as_ref(), inherited)?;
        self.write_points(emitter, &line.points)?;
        emitter.end_element()
    }

    fn write_rings(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        polygon: &Polygon,
        crs: Option<&Crs>,
    ) -> Result<()> {
        if let Some(exterior) = &polygon.exterior {
            emitter.start_element(Some(self.ns()), "exterior")?;
            self.write_line(emitter, ids, "LinearRing", exterior, crs)?;
            emitter.end_element()?;
        }
        for interior in &polygon.interiors {
            emitter.start_element(Some(self.ns()), "interior")?;
            self.write_line(emitter, ids, "LinearRing", interior, crs)?;
            emitter.end_element()?;
        }
        Ok(())
    }

    fn write_geometry(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        geometry: &Geometry,
        inherited: Option<&Crs>,
    ) -> Result<()> {
        match geometry {
            Geometry::Point(point) => {
                self.start(emitter, ids, "Point", point.id.as_deref(), point.crs.as_ref(), inherited)?;
                self.write_pos(emitter, "pos", &point.coordinates)?;
                emitter.end_element()
            }
            Geometry::LineString(line) => self.write_line(emitter, ids, "LineString", line, inherited),
            Geometry::LinearRing(ring) => self.write_line(emitter, ids, "LinearRing", ring, inherited),
            Geometry::Curve(curve) => {
                self.start(emitter, ids, "Curve", curve.id.as_deref(), curve.crs.as_ref(), inherited)?;
                emitter.start_element(Some(self.ns()), "segments")?;
                for segment in &curve.segments {
                    emitter.start_element(Some(self.ns()), "LineStringSegment")?;
                    emitter.attribute(None, "interpolation", "linear")?;
                    self.write_points(emitter, segment)?;
                    emitter.end_element()?;
                }
                emitter.end_element()?;
                emitter.end_element()
            }
            Geometry::Polygon(polygon) => {
                self.start(emitter, ids, "Polygon", polygon.id.as_deref(), polygon.crs.as_ref(), inherited)?;
                let crs = polygon.crs.as_ref().or(inherited);
                self.write_rings(emitter, ids, polygon, crs)?;
                emitter.end_element()
            }
            Geometry::Surface(surface) => {
                self.start(emitter, ids, "Surface", surface.id.as_deref(), surface.crs.as_ref(), inherited)?;
                let crs = surface.crs.as_ref().or(inherited);
                emitter.start_element(Some(self.ns()), "patches")?;
                for patch in &surface.patches {
                    emitter.start_element(Some(self.ns()), "PolygonPatch")?;
                    emitter.attribute(None, "interpolation", "planar")?;
                    self.write_rings(emitter, ids, patch, crs)?;
                    emitter.end_element()?;
                }
                emitter.end_element()?;
                emitter.end_element()
            }
            Geometry::Envelope(envelope) => self.write_envelope(emitter, envelope, inherited),
            Geometry::Multi(multi) => self.write_multi(emitter, ids, multi, inherited),
            Geometry::Reference(reference) => match reference.resolved() {
                Some(resolved) => self.write_geometry(emitter, ids, &resolved, inherited),
                None => Err(Error::Unsupported(format!(
                    "Cannot write unresolved geometry reference '{}' as an element",
                    reference.reference.uri()
                ))),
            },
        }
    }

    fn write_multi(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        multi: &MultiGeometry,
        inherited: Option<&Crs>,
    ) -> Result<()> {
        let pre_32 = self.version.is_pre_32();
        let (element, property) = match multi.kind {
            AggregateKind::MultiPoint => ("MultiPoint", "pointMember"),
            AggregateKind::MultiLineString if pre_32 => ("MultiLineString", "lineStringMember"),
            AggregateKind::MultiLineString | AggregateKind::MultiCurve => ("MultiCurve", "curveMember"),
            AggregateKind::MultiPolygon if pre_32 => ("MultiPolygon", "polygonMember"),
            AggregateKind::MultiPolygon | AggregateKind::MultiSurface => ("MultiSurface", "surfaceMember"),
            AggregateKind::MultiGeometry => ("MultiGeometry", "geometryMember"),
        };
        self.start(emitter, ids, element, multi.id.as_deref(), multi.crs.as_ref(), inherited)?;
        let crs = multi.crs.as_ref().or(inherited);
        for member in &multi.members {
            if write_member_stub(emitter, ids, self.ns(), property, member)? {
                continue;
            }
            emitter.start_element(Some(self.ns()), property)?;
            self.write_geometry(emitter, ids, member, crs)?;
            emitter.end_element()?;
        }
        emitter.end_element()
    }

    fn write_envelope(
        &self,
        emitter: &mut XmlEmitter<'_>,
        envelope: &Envelope,
        inherited: Option<&Crs>,
    ) -> Result<()> {
        emitter.start_element(Some(self.ns()), "Envelope")?;
        write_srs_name(emitter, envelope.crs.as_ref(), inherited)?;
        let (lower, upper) = if self.version == GmlVersion::Gml30 {
            ("pos", "pos")
        } else {
            ("lowerCorner", "upperCorner")
        };
        self.write_pos(emitter, lower, &envelope.lower)?;
        self.write_pos(emitter, upper, &envelope.upper)?;
        emitter.end_element()
    }
}

fn dimension_attribute(cursor: &XmlCursor<'_>) -> Result<Option<usize>> {
    let Some(value) = cursor.attribute("srsDimension").or_else(|| cursor.attribute("dimension")) else {
        return Ok(None);
    };
    match value.trim().parse::<usize>() {
        Ok(dimension) if dimension > 0 => Ok(Some(dimension)),
        _ => Err(cursor.parse_error(format!("Invalid srsDimension '{}'.", value))),
    }
}

fn push_position(cursor: &XmlCursor<'_>, points: &mut Option<Points>, position: &[f64]) -> Result<()> {
    points
        .get_or_insert_with(|| Points::new(position.len()))
        .push(position)
        .map_err(|e| cursor.parse_error(e.to_string()))
}

fn extend_points(cursor: &XmlCursor<'_>, points: &mut Option<Points>, parsed: &Points) -> Result<()> {
    match points.as_mut() {
        Some(points) => points.extend(parsed).map_err(|e| cursor.parse_error(e.to_string())),
        None => {
            *points = Some(parsed.clone());
            Ok(())
        }
    }
}

impl GeometryReader for Gml3Codec {
    fn version(&self) -> GmlVersion {
        self.version
    }

    fn is_geometry_element(&self, name: &QName) -> bool {
        if !name.in_namespace(self.ns()) {
            return false;
        }
        let local = name.local_name.as_str();
        if !self.version.is_pre_32() && matches!(local, "MultiLineString" | "MultiPolygon") {
            return false;
        }
        SUPPORTED.contains(&local) || UNSUPPORTED.contains(&local)
    }

    fn is_envelope_element(&self, name: &QName) -> bool {
        name.is(self.ns(), "Envelope")
    }

    fn parse(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        default_crs: Option<&Crs>,
    ) -> Result<Geometry> {
        self.parse_geometry(cursor, ids, default_crs, None)
    }

    fn parse_envelope(&self, cursor: &mut XmlCursor<'_>, default_crs: Option<&Crs>) -> Result<Envelope> {
        let name = cursor.require_start()?.clone();
        if !self.is_envelope_element(&name) {
            return Err(cursor.parse_error(format!("Expected 'gml:Envelope', found '{}'.", name)));
        }
        self.parse_envelope_element(cursor, default_crs, None)
    }
}

impl GeometryWriter for Gml3Codec {
    fn export(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        geometry: &Geometry,
        inherited_crs: Option<&Crs>,
    ) -> Result<()> {
        self.write_geometry(emitter, ids, geometry, inherited_crs)
    }

    fn export_envelope(&self, emitter: &mut XmlEmitter<'_>, envelope: &Envelope) -> Result<()> {
        self.write_envelope(emitter, envelope, None)
    }
}
