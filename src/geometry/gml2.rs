//! GML 2.1.2 geometry codec
//!
//! GML 2 knows points, line strings, polygons, boxes and the three typed
//! aggregates plus `MultiGeometry`. Coordinates come as `gml:coordinates`
//! text or `gml:coord` tuples, ids as `gid`. GML 3 shapes are downgraded on
//! write: curves become line strings, surfaces become polygons.

use super::codec::{
    check_member_kind, coordinate_syntax, parse_coord, property_reference, read_coord, read_id, register_nested,
    resolve_crs, write_member_stub, write_srs_name, GeometryOptions, GeometryReader, GeometryWriter,
};
use super::coords::parse_coordinates;
use super::{
    AggregateKind, Envelope, Geometry, GeometryKind, LineString, MultiGeometry, Point, Points, Polygon,
};
use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::namespaces::{QName, GML_PRE_32_NS};
use crate::reference::DocumentIdContext;
use crate::version::GmlVersion;
use crate::xml::{XmlCursor, XmlEmitter};

const NS: &str = GML_PRE_32_NS;

const GEOMETRY_ELEMENTS: &[&str] = &[
    "Point",
    "LineString",
    "LinearRing",
    "Polygon",
    "Box",
    "MultiPoint",
    "MultiLineString",
    "MultiPolygon",
    "MultiGeometry",
];

/// GML 2 geometry reader and writer
#[derive(Debug, Clone)]
pub struct Gml2Codec {
    options: GeometryOptions,
}

impl Gml2Codec {
    /// Create a codec
    pub fn new(options: GeometryOptions) -> Self {
        Self { options }
    }

    /// Settings in use
    pub fn options(&self) -> &GeometryOptions {
        &self.options
    }

    fn header(
        &self,
        cursor: &XmlCursor<'_>,
        inherited: Option<&Crs>,
    ) -> Result<(Option<String>, Option<Crs>)> {
        let id = read_id(cursor, cursor.attribute("gid"), self.options.lax)?;
        let crs = resolve_crs(cursor, &self.options, inherited)?;
        Ok((id, crs))
    }

    fn parse_geometry(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
    ) -> Result<Geometry> {
        let name = cursor.require_start()?.clone();
        if !name.in_namespace(NS) {
            return Err(cursor.parse_error(format!(
                "Unexpected element '{}'. Expected a GML 2 geometry element.",
                name
            )));
        }
        match name.local_name.as_str() {
            "Point" => self.parse_point(cursor, crs).map(Geometry::Point),
            "LineString" => self
                .parse_line_string(cursor, crs, 2)
                .map(Geometry::LineString),
            "LinearRing" => self
                .parse_line_string(cursor, crs, 4)
                .map(Geometry::LinearRing),
            "Polygon" => self.parse_polygon(cursor, crs).map(Geometry::Polygon),
            "Box" => self.parse_box(cursor, crs).map(Geometry::Envelope),
            "MultiPoint" => self
                .parse_multi(cursor, ids, crs, AggregateKind::MultiPoint, "pointMember", GeometryKind::Point)
                .map(Geometry::Multi),
            "MultiLineString" => self
                .parse_multi(
                    cursor,
                    ids,
                    crs,
                    AggregateKind::MultiLineString,
                    "lineStringMember",
                    GeometryKind::LineString,
                )
                .map(Geometry::Multi),
            "MultiPolygon" => self
                .parse_multi(
                    cursor,
                    ids,
                    crs,
                    AggregateKind::MultiPolygon,
                    "polygonMember",
                    GeometryKind::Polygon,
                )
                .map(Geometry::Multi),
            "MultiGeometry" => self
                .parse_multi(
                    cursor,
                    ids,
                    crs,
                    AggregateKind::MultiGeometry,
                    "geometryMember",
                    GeometryKind::Any,
                )
                .map(Geometry::Multi),
            other => Err(cursor.parse_error(format!("Invalid GML 2 geometry element 'gml:{}'.", other))),
        }
    }

    fn parse_point(&self, cursor: &mut XmlCursor<'_>, inherited: Option<&Crs>) -> Result<Point> {
        let name = cursor.require_start()?.clone();
        let (id, crs) = self.header(cursor, inherited)?;

        cursor.next_tag()?;
        if !cursor.is_start() {
            return Err(cursor.parse_error(
                "Error in 'gml:Point' element. Must contain one of the following child elements: 'gml:coordinates' or 'gml:coord'.",
            ));
        }
        let child = cursor.require_start()?.clone();
        let coordinates = if child.is(NS, "coordinates") {
            let syntax = coordinate_syntax(cursor);
            let text = cursor.element_text()?;
            let points = parse_coordinates(&text, &syntax, self.options.lax, &self.options.limits)
                .map_err(|e| cursor.locate(e))?;
            if points.len() != 1 {
                return Err(cursor.parse_error(format!(
                    "Error in 'gml:Point' element. Expected exactly one coordinate tuple, found {}.",
                    points.len()
                )));
            }
            points.ordinates().to_vec()
        } else if child.is(NS, "coord") {
            parse_coord(cursor, NS)?
        } else {
            return Err(cursor.parse_error(format!(
                "Error in 'gml:Point' element. Expected either a 'gml:coordinates' or a 'gml:coord' element, but found '{}'.",
                child
            )));
        };

        cursor.next_tag()?;
        cursor.require_end(&name)?;
        Ok(Point {
            id,
            crs,
            coordinates,
        })
    }

    // coordinates / coord children up to the end of the current element
    fn parse_points(&self, cursor: &mut XmlCursor<'_>, label: &str) -> Result<Points> {
        let mut points: Option<Points> = None;
        loop {
            cursor.next_tag()?;
            if cursor.is_end() {
                break;
            }
            let child = cursor.require_start()?.clone();
            if child.is(NS, "coordinates") {
                let syntax = coordinate_syntax(cursor);
                let text = cursor.element_text()?;
                let parsed = parse_coordinates(&text, &syntax, self.options.lax, &self.options.limits)
                    .map_err(|e| cursor.locate(e))?;
                match points.as_mut() {
                    Some(points) => points.extend(&parsed).map_err(|e| cursor.parse_error(e.to_string()))?,
                    None => points = Some(parsed),
                }
            } else if child.is(NS, "coord") {
                let Some(position) = read_coord(cursor, NS, self.options.lax)? else {
                    continue;
                };
                let points = points.get_or_insert_with(|| Points::new(position.len()));
                points
                    .push(&position)
                    .map_err(|e| cursor.parse_error(e.to_string()))?;
            } else {
                return Err(cursor.parse_error(format!(
                    "Error in 'gml:{}' element. Unexpected child '{}'.",
                    label, child
                )));
            }
        }
        Ok(points.unwrap_or_else(|| Points::new(2)))
    }

    fn parse_line_string(
        &self,
        cursor: &mut XmlCursor<'_>,
        inherited: Option<&Crs>,
        min_points: usize,
    ) -> Result<LineString> {
        let name = cursor.require_start()?.clone();
        let (id, crs) = self.header(cursor, inherited)?;
        let points = self.parse_points(cursor, &name.local_name)?;
        if points.len() < min_points {
            let msg = format!(
                "Error in 'gml:{}' element. Must consist of {} points at least.",
                name.local_name, min_points
            );
            if !self.options.lax || points.is_empty() {
                return Err(cursor.parse_error(msg));
            }
            tracing::warn!("{}", msg);
        }
        cursor.require_end(&name)?;
        Ok(LineString { id, crs, points })
    }

    fn parse_boundary(&self, cursor: &mut XmlCursor<'_>, crs: Option<&Crs>) -> Result<LineString> {
        let boundary = cursor.require_start()?.clone();
        cursor.next_tag()?;
        let ring_name = cursor.require_start()?.clone();
        if !ring_name.is(NS, "LinearRing") {
            return Err(cursor.parse_error(format!(
                "Error in 'gml:{}' element. Expected a 'gml:LinearRing', found '{}'.",
                boundary.local_name, ring_name
            )));
        }
        let ring = self.parse_line_string(cursor, crs, 4)?;
        cursor.next_tag()?;
        cursor.require_end(&boundary)?;
        Ok(ring)
    }

    fn parse_polygon(&self, cursor: &mut XmlCursor<'_>, inherited: Option<&Crs>) -> Result<Polygon> {
        let name = cursor.require_start()?.clone();
        let (id, crs) = self.header(cursor, inherited)?;

        cursor.next_tag()?;
        if !cursor.name().map(|n| n.is(NS, "outerBoundaryIs")).unwrap_or(false) || !cursor.is_start() {
            return Err(cursor.parse_error(
                "Error in 'gml:Polygon' element. Expected a 'gml:outerBoundaryIs' element.",
            ));
        }
        let exterior = self.parse_boundary(cursor, crs.as_ref())?;

        let mut interiors = Vec::new();
        loop {
            cursor.next_tag()?;
            if cursor.is_end() {
                break;
            }
            let child = cursor.require_start()?.clone();
            if !child.is(NS, "innerBoundaryIs") {
                return Err(cursor.parse_error(format!(
                    "Error in 'gml:Polygon' element. Expected a 'gml:innerBoundaryIs' element, found '{}'.",
                    child
                )));
            }
            interiors.push(self.parse_boundary(cursor, crs.as_ref())?);
        }
        cursor.require_end(&name)?;

        Ok(Polygon {
            id,
            crs,
            exterior: Some(exterior),
            interiors,
        })
    }

    fn parse_box(&self, cursor: &mut XmlCursor<'_>, inherited: Option<&Crs>) -> Result<Envelope> {
        let name = cursor.require_start()?.clone();
        let crs = resolve_crs(cursor, &self.options, inherited)?;
        let points = self.parse_points(cursor, "Box")?;
        if points.len() != 2 {
            return Err(cursor.parse_error(
                "Error in 'gml:Box' element. Must consist of exactly two points.",
            ));
        }
        cursor.require_end(&name)?;
        Ok(Envelope {
            crs,
            lower: points.get(0).map(<[f64]>::to_vec).unwrap_or_default(),
            upper: points.get(1).map(<[f64]>::to_vec).unwrap_or_default(),
        })
    }

    fn parse_multi(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        inherited: Option<&Crs>,
        kind: AggregateKind,
        member_property: &str,
        member_kind: GeometryKind,
    ) -> Result<MultiGeometry> {
        let name = cursor.require_start()?.clone();
        let (id, crs) = self.header(cursor, inherited)?;

        let mut members = Vec::new();
        loop {
            cursor.next_tag()?;
            if cursor.is_end() {
                break;
            }
            let property = cursor.require_start()?.clone();
            if !property.is(NS, member_property) {
                return Err(cursor.parse_error(format!(
                    "Error in 'gml:{}' element. Expected 'gml:{}', found '{}'.",
                    name.local_name, member_property, property
                )));
            }
            if let Some(reference) = property_reference(cursor, ids, member_kind)? {
                members.push(reference);
                continue;
            }
            cursor.next_tag()?;
            let member = self.parse_geometry(cursor, ids, crs.as_ref())?;
            check_member_kind(cursor, member_kind, &member, self.options.lax)?;
            register_nested(ids, &member)?;
            members.push(member);
            cursor.next_tag()?;
            cursor.require_end(&property)?;
        }
        cursor.require_end(&name)?;

        Ok(MultiGeometry {
            id,
            crs,
            kind,
            members,
        })
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
        emitter.start_element(Some(NS), local_name)?;
        if let Some(id) = id {
            emitter.attribute(None, "gid", id)?;
            ids.mark_exported(id);
        }
        write_srs_name(emitter, crs, inherited)
    }

    fn write_coordinates(&self, emitter: &mut XmlEmitter<'_>, points: &Points) -> Result<()> {
        emitter.start_element(Some(NS), "coordinates")?;
        emitter.attribute(None, "decimal", ".")?;
        emitter.attribute(None, "cs", ",")?;
        emitter.attribute(None, "ts", " ")?;
        emitter.characters(&self.options.formatter.format_coordinates(points))?;
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
        self.write_coordinates(emitter, &line.points)?;
        emitter.end_element()
    }

    fn write_polygon(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        polygon: &Polygon,
        inherited: Option<&Crs>,
    ) -> Result<()> {
        let exterior = polygon.exterior.as_ref().ok_or_else(|| {
            Error::Unsupported("GML 2 polygons require an exterior ring".to_string())
        })?;
        self.start(emitter, ids, "Polygon", polygon.id.as_deref(), polygon.crs.as_ref(), inherited)?;
        let crs = polygon.crs.as_ref().or(inherited);
        emitter.start_element(Some(NS), "outerBoundaryIs")?;
        self.write_line(emitter, ids, "LinearRing", exterior, crs)?;
        emitter.end_element()?;
        for interior in &polygon.interiors {
            emitter.start_element(Some(NS), "innerBoundaryIs")?;
            self.write_line(emitter, ids, "LinearRing", interior, crs)?;
            emitter.end_element()?;
        }
        emitter.end_element()
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
                let points = Points::from_positions(&[point.coordinates.as_slice()])?;
                self.write_coordinates(emitter, &points)?;
                emitter.end_element()
            }
            Geometry::LineString(line) => self.write_line(emitter, ids, "LineString", line, inherited),
            Geometry::LinearRing(ring) => self.write_line(emitter, ids, "LinearRing", ring, inherited),
            Geometry::Curve(curve) => {
                let line = LineString {
                    id: curve.id.clone(),
                    crs: curve.crs.clone(),
                    points: curve.control_points()?,
                };
                self.write_line(emitter, ids, "LineString", &line, inherited)
            }
            Geometry::Polygon(polygon) => self.write_polygon(emitter, ids, polygon, inherited),
            Geometry::Surface(surface) => match surface.patches.as_slice() {
                [patch] => {
                    let polygon = Polygon {
                        id: surface.id.clone(),
                        crs: surface.crs.clone(),
                        ..patch.clone()
                    };
                    self.write_polygon(emitter, ids, &polygon, inherited)
                }
                patches => {
                    let multi = MultiGeometry {
                        id: surface.id.clone(),
                        crs: surface.crs.clone(),
                        kind: AggregateKind::MultiPolygon,
                        members: patches.iter().cloned().map(Geometry::Polygon).collect(),
                    };
                    self.write_multi(emitter, ids, &multi, inherited)
                }
            },
            Geometry::Envelope(envelope) => self.write_box(emitter, envelope, inherited),
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
        let (element, property) = match multi.kind {
            AggregateKind::MultiPoint => ("MultiPoint", "pointMember"),
            AggregateKind::MultiLineString | AggregateKind::MultiCurve => {
                ("MultiLineString", "lineStringMember")
            }
            AggregateKind::MultiPolygon | AggregateKind::MultiSurface => {
                ("MultiPolygon", "polygonMember")
            }
            AggregateKind::MultiGeometry => ("MultiGeometry", "geometryMember"),
        };
        self.start(emitter, ids, element, multi.id.as_deref(), multi.crs.as_ref(), inherited)?;
        let crs = multi.crs.as_ref().or(inherited);

        for member in &multi.members {
            // surfaces with several patches turn into several polygon members
            let expanded: Vec<Geometry> = match member {
                Geometry::Surface(surface) if property == "polygonMember" && surface.patches.len() > 1 => {
                    surface.patches.iter().cloned().map(Geometry::Polygon).collect()
                }
                other => vec![other.clone()],
            };
            for member in &expanded {
                if write_member_stub(emitter, ids, NS, property, member)? {
                    continue;
                }
                emitter.start_element(Some(NS), property)?;
                self.write_geometry(emitter, ids, member, crs)?;
                emitter.end_element()?;
            }
        }
        emitter.end_element()
    }

    fn write_box(&self, emitter: &mut XmlEmitter<'_>, envelope: &Envelope, inherited: Option<&Crs>) -> Result<()> {
        emitter.start_element(Some(NS), "Box")?;
        write_srs_name(emitter, envelope.crs.as_ref(), inherited)?;
        let points = Points::from_positions(&[envelope.lower.as_slice(), envelope.upper.as_slice()])?;
        self.write_coordinates(emitter, &points)?;
        emitter.end_element()
    }
}

impl GeometryReader for Gml2Codec {
    fn version(&self) -> GmlVersion {
        GmlVersion::Gml2
    }

    fn is_geometry_element(&self, name: &QName) -> bool {
        name.in_namespace(NS) && GEOMETRY_ELEMENTS.contains(&name.local_name.as_str())
    }

    fn is_envelope_element(&self, name: &QName) -> bool {
        name.is(NS, "Box")
    }

    fn parse(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        default_crs: Option<&Crs>,
    ) -> Result<Geometry> {
        self.parse_geometry(cursor, ids, default_crs)
    }

    fn parse_envelope(&self, cursor: &mut XmlCursor<'_>, default_crs: Option<&Crs>) -> Result<Envelope> {
        let name = cursor.require_start()?.clone();
        if !self.is_envelope_element(&name) {
            return Err(cursor.parse_error(format!("Expected 'gml:Box', found '{}'.", name)));
        }
        self.parse_box(cursor, default_crs)
    }
}

impl GeometryWriter for Gml2Codec {
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
        self.write_box(emitter, envelope, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::PrefixBindings;
    use pretty_assertions::assert_eq;

    fn read(xml: &str, lax: bool) -> Result<Geometry> {
        let codec = Gml2Codec::new(GeometryOptions {
            lax,
            ..GeometryOptions::default()
        });
        let mut ids = DocumentIdContext::new(GmlVersion::Gml2);
        let mut cursor = XmlCursor::from_str(xml);
        cursor.next_tag()?;
        let geometry = codec.parse(&mut cursor, &mut ids, None)?;
        assert!(cursor.is_end());
        Ok(geometry)
    }

    fn write(geometry: &Geometry) -> String {
        let codec = Gml2Codec::new(GeometryOptions::default());
        let mut ids = DocumentIdContext::new(GmlVersion::Gml2);
        let mut out = Vec::new();
        {
            let mut emitter = XmlEmitter::new(&mut out, PrefixBindings::defaults_for(GmlVersion::Gml2));
            codec.export(&mut emitter, &mut ids, geometry, None).unwrap();
            emitter.finish().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_point_coordinates() {
        let geometry = read(
            r#"<gml:Point xmlns:gml="http://www.opengis.net/gml" srsName="EPSG:4326" gid="P1"><gml:coordinates>10,20</gml:coordinates></gml:Point>"#,
            false,
        )
        .unwrap();
        match geometry {
            Geometry::Point(p) => {
                assert_eq!(p.coordinates, vec![10.0, 20.0]);
                assert_eq!(p.crs, Some(Crs::new("EPSG:4326")));
                assert_eq!(p.id.as_deref(), Some("P1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_point_coord() {
        let geometry = read(
            r#"<gml:Point xmlns:gml="http://www.opengis.net/gml"><gml:coord><gml:X>1</gml:X><gml:Y>2</gml:Y><gml:Z>3</gml:Z></gml:coord></gml:Point>"#,
            false,
        )
        .unwrap();
        assert!(matches!(geometry, Geometry::Point(ref p) if p.coordinates == vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_polygon_with_hole() {
        let geometry = read(
            r#"<gml:Polygon xmlns:gml="http://www.opengis.net/gml" srsName="EPSG:4326">
                 <gml:outerBoundaryIs><gml:LinearRing><gml:coordinates>0,0 10,0 10,10 0,0</gml:coordinates></gml:LinearRing></gml:outerBoundaryIs>
                 <gml:innerBoundaryIs><gml:LinearRing><gml:coordinates>1,1 2,1 2,2 1,1</gml:coordinates></gml:LinearRing></gml:innerBoundaryIs>
               </gml:Polygon>"#,
            false,
        )
        .unwrap();
        match geometry {
            Geometry::Polygon(p) => {
                assert_eq!(p.exterior.unwrap().points.len(), 4);
                assert_eq!(p.interiors.len(), 1);
                assert_eq!(p.interiors[0].crs, Some(Crs::new("EPSG:4326")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_box_needs_two_points() {
        let err = read(
            r#"<gml:Box xmlns:gml="http://www.opengis.net/gml"><gml:coordinates>0,0</gml:coordinates></gml:Box>"#,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly two points"));
    }

    #[test]
    fn test_multi_point_with_reference() {
        let geometry = read(
            r##"<gml:MultiPoint xmlns:gml="http://www.opengis.net/gml" xmlns:xlink="http://www.w3.org/1999/xlink" srsName="EPSG:4326">
                 <gml:pointMember><gml:Point gid="A"><gml:coordinates>1,2</gml:coordinates></gml:Point></gml:pointMember>
                 <gml:pointMember xlink:href="#A"/>
               </gml:MultiPoint>"##,
            false,
        )
        .unwrap();
        match geometry {
            Geometry::Multi(m) => {
                assert_eq!(m.kind, AggregateKind::MultiPoint);
                assert_eq!(m.members.len(), 2);
                assert_eq!(m.members[0].crs(), Some(&Crs::new("EPSG:4326")));
                match &m.members[1] {
                    Geometry::Reference(r) => assert!(r.resolved().is_some()),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lax_coordinates() {
        let xml = r#"<gml:LineString xmlns:gml="http://www.opengis.net/gml"><gml:coordinates>10,abc 1,2 3,4</gml:coordinates></gml:LineString>"#;
        assert!(read(xml, false).unwrap_err().is_parse());
        match read(xml, true).unwrap() {
            Geometry::LineString(l) => assert_eq!(l.points.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_write_point() {
        let point = Geometry::Point(Point {
            id: Some("P1".to_string()),
            crs: Some(Crs::new("EPSG:4326")),
            coordinates: vec![10.0, 20.5],
        });
        assert_eq!(
            write(&point),
            r#"<gml:Point xmlns:gml="http://www.opengis.net/gml" gid="P1" srsName="EPSG:4326"><gml:coordinates decimal="." cs="," ts=" ">10,20.5</gml:coordinates></gml:Point>"#
        );
    }

    #[test]
    fn test_write_downgrades_curve() {
        let curve = Geometry::Curve(crate::geometry::Curve {
            id: None,
            crs: None,
            segments: vec![
                Points::from_positions(&[[0.0, 0.0], [1.0, 1.0]]).unwrap(),
                Points::from_positions(&[[1.0, 1.0], [2.0, 0.0]]).unwrap(),
            ],
        });
        let xml = write(&curve);
        assert!(xml.starts_with("<gml:LineString"));
        assert!(xml.contains(">0,0 1,1 2,0<"));
    }
}
