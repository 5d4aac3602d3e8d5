//! Version dispatch for the geometry codecs
//!
//! [`GeometryReader`] and [`GeometryWriter`] are the seams the feature codec
//! talks to. [`GeometryCodec`] picks the GML 2 or GML 3 implementation once
//! per session and adds what both share: the CRS presence check on read and
//! reprojection to the output CRS on write.

use super::coords::CoordinateSyntax;
use super::gml2::Gml2Codec;
use super::gml3::Gml3Codec;
use super::{CoordinateFormatter, Envelope, Geometry, GeometryKind, GeometryReference};
use crate::crs::{Crs, CrsRegistry, CrsTransformer};
use crate::error::{CrsError, Error, Result};
use crate::limits::Limits;
use crate::names::validate_gml_id;
use crate::namespaces::{QName, XLINK_NS};
use crate::reference::{DocumentIdContext, GmlObject, ObjectCategory};
use crate::version::GmlVersion;
use crate::xml::{XmlCursor, XmlEmitter};
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// Reads geometry elements
pub trait GeometryReader: fmt::Debug {
    /// GML version handled
    fn version(&self) -> GmlVersion;

    /// Whether `name` is a geometry element of this version
    fn is_geometry_element(&self, name: &QName) -> bool;

    /// Whether `name` is an envelope element (`gml:Envelope` or `gml:Box`)
    fn is_envelope_element(&self, name: &QName) -> bool;

    /// Parse the geometry element at the cursor.
    ///
    /// `default_crs` applies when the element has no `srsName`. Leaves the
    /// cursor on the element's end tag.
    fn parse(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        default_crs: Option<&Crs>,
    ) -> Result<Geometry>;

    /// Parse an envelope element; leaves the cursor on its end tag
    fn parse_envelope(&self, cursor: &mut XmlCursor<'_>, default_crs: Option<&Crs>) -> Result<Envelope>;
}

/// Writes geometry elements
pub trait GeometryWriter: fmt::Debug {
    /// Write a geometry element.
    ///
    /// `srsName` is omitted when the geometry's CRS equals `inherited_crs`.
    fn export(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        geometry: &Geometry,
        inherited_crs: Option<&Crs>,
    ) -> Result<()>;

    /// Write an envelope (`gml:Box` for GML 2)
    fn export_envelope(&self, emitter: &mut XmlEmitter<'_>, envelope: &Envelope) -> Result<()>;
}

/// Settings shared by both codecs
#[derive(Clone, Default)]
pub struct GeometryOptions {
    /// Downgrade malformed coordinates and ids to warnings
    pub lax: bool,
    /// Dimension used when the document does not state one
    pub default_dimension: Option<usize>,
    /// Processing limits
    pub limits: Limits,
    /// Validates `srsName` values; without one every name is accepted
    pub crs_registry: Option<Rc<dyn CrsRegistry>>,
    /// Target CRS for writing
    pub output_crs: Option<Crs>,
    /// Reprojection service used when writing to `output_crs`
    pub transformer: Option<Rc<dyn CrsTransformer>>,
    /// Ordinate formatting
    pub formatter: CoordinateFormatter,
}

impl fmt::Debug for GeometryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryOptions")
            .field("lax", &self.lax)
            .field("default_dimension", &self.default_dimension)
            .field("output_crs", &self.output_crs)
            .field("formatter", &self.formatter)
            .finish()
    }
}

/// Geometry codec selected by GML version
#[derive(Debug, Clone)]
pub enum GeometryCodec {
    /// GML 2.1.2
    Gml2(Gml2Codec),
    /// GML 3.0, 3.1 and 3.2
    Gml3(Gml3Codec),
}

impl GeometryCodec {
    /// Build the codec for `version`
    pub fn for_version(version: GmlVersion, options: GeometryOptions) -> Self {
        match version {
            GmlVersion::Gml2 => GeometryCodec::Gml2(Gml2Codec::new(options)),
            v => GeometryCodec::Gml3(Gml3Codec::new(v, options)),
        }
    }

    fn reader(&self) -> &dyn GeometryReader {
        match self {
            GeometryCodec::Gml2(codec) => codec,
            GeometryCodec::Gml3(codec) => codec,
        }
    }

    fn writer(&self) -> &dyn GeometryWriter {
        match self {
            GeometryCodec::Gml2(codec) => codec,
            GeometryCodec::Gml3(codec) => codec,
        }
    }

    fn options(&self) -> &GeometryOptions {
        match self {
            GeometryCodec::Gml2(codec) => codec.options(),
            GeometryCodec::Gml3(codec) => codec.options(),
        }
    }

    fn check_crs(&self, cursor: &XmlCursor<'_>, crs: Option<&Crs>, element: &QName) -> Result<()> {
        if crs.is_some() {
            return Ok(());
        }
        if self.options().lax {
            warn!(element = %element, "geometry without srsName and no default CRS");
            return Ok(());
        }
        Err(cursor.locate(
            CrsError::Missing {
                element: element.to_string(),
            }
            .into(),
        ))
    }

    fn project(&self, geometry: &Geometry) -> Result<Option<Geometry>> {
        let options = self.options();
        let Some(target) = options.output_crs.as_ref() else {
            return Ok(None);
        };
        if geometry.is_reference() || geometry.crs() == Some(target) {
            return Ok(None);
        }
        if geometry.crs().is_none() {
            // nothing to transform from, just label it
            return Ok(Some(geometry.with_crs(Some(target.clone()))));
        }
        match options.transformer.as_ref() {
            Some(transformer) => transformer.transform(geometry, target).map(Some),
            None => Err(Error::Transformation(format!(
                "No CRS transformer configured to transform from '{}' to '{}'",
                geometry.crs().map(|c| c.name()).unwrap_or_default(),
                target
            ))),
        }
    }
}

impl GeometryReader for GeometryCodec {
    fn version(&self) -> GmlVersion {
        self.reader().version()
    }

    fn is_geometry_element(&self, name: &QName) -> bool {
        self.reader().is_geometry_element(name)
    }

    fn is_envelope_element(&self, name: &QName) -> bool {
        self.reader().is_envelope_element(name)
    }

    fn parse(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        default_crs: Option<&Crs>,
    ) -> Result<Geometry> {
        let element = cursor.require_start()?.clone();
        let geometry = self.reader().parse(cursor, ids, default_crs)?;
        if !geometry.is_reference() {
            self.check_crs(cursor, geometry.crs(), &element)?;
        }
        Ok(geometry)
    }

    fn parse_envelope(&self, cursor: &mut XmlCursor<'_>, default_crs: Option<&Crs>) -> Result<Envelope> {
        let element = cursor.require_start()?.clone();
        let envelope = self.reader().parse_envelope(cursor, default_crs)?;
        self.check_crs(cursor, envelope.crs.as_ref(), &element)?;
        Ok(envelope)
    }
}

impl GeometryWriter for GeometryCodec {
    fn export(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        geometry: &Geometry,
        inherited_crs: Option<&Crs>,
    ) -> Result<()> {
        match self.project(geometry)? {
            Some(projected) => self.writer().export(emitter, ids, &projected, inherited_crs),
            None => self.writer().export(emitter, ids, geometry, inherited_crs),
        }
    }

    fn export_envelope(&self, emitter: &mut XmlEmitter<'_>, envelope: &Envelope) -> Result<()> {
        let geometry = Geometry::Envelope(envelope.clone());
        match self.project(&geometry)? {
            Some(Geometry::Envelope(projected)) => self.writer().export_envelope(emitter, &projected),
            Some(_) => Err(Error::Transformation(
                "Transforming an envelope did not produce an envelope".to_string(),
            )),
            None => self.writer().export_envelope(emitter, envelope),
        }
    }
}

/// `srsName` of the current element, or the inherited CRS
pub(crate) fn resolve_crs(
    cursor: &XmlCursor<'_>,
    options: &GeometryOptions,
    inherited: Option<&Crs>,
) -> Result<Option<Crs>> {
    match cursor.attribute("srsName").map(str::trim) {
        Some(name) if !name.is_empty() => match options.crs_registry.as_ref() {
            Some(registry) => registry.lookup(name).map(Some).map_err(|e| cursor.locate(e)),
            None => Ok(Some(Crs::new(name))),
        },
        _ => Ok(inherited.cloned()),
    }
}

/// Read and validate an id attribute
pub(crate) fn read_id(cursor: &XmlCursor<'_>, value: Option<&str>, lax: bool) -> Result<Option<String>> {
    let Some(id) = value else {
        return Ok(None);
    };
    if let Err(err) = validate_gml_id(id) {
        if !lax {
            return Err(cursor.parse_error(err.to_string()));
        }
        warn!(id, "invalid object id");
    }
    Ok(Some(id.to_string()))
}

/// `decimal`, `cs` and `ts` attributes of a `gml:coordinates` element
pub(crate) fn coordinate_syntax(cursor: &XmlCursor<'_>) -> CoordinateSyntax {
    let defaults = CoordinateSyntax::default();
    CoordinateSyntax {
        decimal: cursor
            .attribute("decimal")
            .map(str::to_string)
            .unwrap_or(defaults.decimal),
        cs: cursor.attribute("cs").map(str::to_string).unwrap_or(defaults.cs),
        ts: cursor.attribute("ts").map(str::to_string).unwrap_or(defaults.ts),
    }
}

/// Parse a `gml:coord` element with `X`, `Y` and optional `Z` children
pub(crate) fn parse_coord(cursor: &mut XmlCursor<'_>, namespace: &str) -> Result<Vec<f64>> {
    match read_coord(cursor, namespace, false)? {
        Some(values) => Ok(values),
        None => Err(cursor.parse_error("Error in 'gml:coord' element. Malformed ordinate.")),
    }
}

/// Read a `gml:coord` tuple. In lax mode a malformed ordinate drops the
/// whole tuple (`None`) once the element has been consumed.
pub(crate) fn read_coord(cursor: &mut XmlCursor<'_>, namespace: &str, lax: bool) -> Result<Option<Vec<f64>>> {
    let mut values = Vec::with_capacity(3);
    let mut malformed = false;
    cursor.next_tag()?;
    for axis in ["X", "Y", "Z"] {
        if !cursor.is_start() {
            break;
        }
        let name = cursor.require_start()?.clone();
        if !name.is(namespace, axis) {
            if axis == "Z" {
                break;
            }
            return Err(cursor.parse_error(format!(
                "Error in 'gml:coord' element. Expected 'gml:{}', but found '{}'.",
                axis, name
            )));
        }
        let text = cursor.element_text()?;
        match text.parse::<f64>() {
            Ok(value) => values.push(value),
            Err(_) if lax => {
                warn!(axis, value = %text, "skipping malformed coordinate tuple");
                malformed = true;
            }
            Err(_) => {
                return Err(cursor.parse_error(format!("Value '{}' cannot be parsed as a double.", text)));
            }
        }
        cursor.next_tag()?;
    }
    if cursor.is_start() {
        return Err(cursor.parse_error("Unexpected element in 'gml:coord'."));
    }
    if malformed {
        return Ok(None);
    }
    if values.len() < 2 {
        return Err(cursor.parse_error("Error in 'gml:coord' element. Expected 'gml:X' and 'gml:Y'."));
    }
    Ok(Some(values))
}

/// If the property at the cursor is an `xlink:href`, build the placeholder
/// and skip to the property's end tag
pub(crate) fn property_reference(
    cursor: &mut XmlCursor<'_>,
    ids: &mut DocumentIdContext,
    expected: GeometryKind,
) -> Result<Option<Geometry>> {
    let Some(href) = cursor.attribute_ns(XLINK_NS, "href").map(str::to_string) else {
        return Ok(None);
    };
    let reference = ids
        .create_reference(&href, ObjectCategory::Geometry)
        .map_err(|e| cursor.locate(e))?;
    cursor.skip_element()?;
    Ok(Some(Geometry::Reference(GeometryReference {
        kind: expected,
        reference,
    })))
}

/// Register a nested geometry that carries an id
pub(crate) fn register_nested(ids: &mut DocumentIdContext, geometry: &Geometry) -> Result<()> {
    if geometry.id().is_some() && !geometry.is_reference() {
        ids.register_object(GmlObject::Geometry(Rc::new(geometry.clone())))?;
    }
    Ok(())
}

/// Check a member against the kind its aggregate allows
pub(crate) fn check_member_kind(
    cursor: &XmlCursor<'_>,
    expected: GeometryKind,
    member: &Geometry,
    lax: bool,
) -> Result<()> {
    if expected.accepts(member.kind()) || member.is_reference() {
        return Ok(());
    }
    let msg = format!("Expected a {} member, found a {}.", expected, member.kind());
    if lax {
        warn!("{}", msg);
        Ok(())
    } else {
        Err(cursor.parse_error(msg))
    }
}

/// Write `srsName` if it differs from the inherited CRS
pub(crate) fn write_srs_name(
    emitter: &mut XmlEmitter<'_>,
    crs: Option<&Crs>,
    inherited: Option<&Crs>,
) -> Result<()> {
    if let Some(crs) = crs {
        if Some(crs) != inherited {
            emitter.attribute(None, "srsName", crs.name())?;
        }
    }
    Ok(())
}

/// Write a member property as `xlink:href` stub if the geometry is a
/// reference or was exported before; returns true if a stub was written
pub(crate) fn write_member_stub(
    emitter: &mut XmlEmitter<'_>,
    ids: &DocumentIdContext,
    namespace: &str,
    property: &str,
    member: &Geometry,
) -> Result<bool> {
    let href = match member {
        Geometry::Reference(r) if r.resolved().is_none() => r.reference.uri().to_string(),
        g => match g.id() {
            Some(id) if ids.is_object_exported(id) => format!("#{}", id),
            _ => return Ok(false),
        },
    };
    emitter.start_element(Some(namespace), property)?;
    emitter.attribute(Some(XLINK_NS), "href", &href)?;
    emitter.end_element()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[derive(Debug)]
    struct Shift;

    impl CrsTransformer for Shift {
        fn transform(&self, geometry: &Geometry, target: &Crs) -> Result<Geometry> {
            match geometry {
                Geometry::Point(p) => Ok(Geometry::Point(Point::new(
                    p.coordinates.iter().map(|c| c + 1.0).collect(),
                    Some(target.clone()),
                ))),
                _ => Err(Error::Transformation("only points".to_string())),
            }
        }
    }

    #[test]
    fn test_projection_requires_transformer() {
        let options = GeometryOptions {
            output_crs: Some(Crs::new("EPSG:25832")),
            ..GeometryOptions::default()
        };
        let codec = GeometryCodec::for_version(GmlVersion::Gml32, options);
        let point = Geometry::Point(Point::new(vec![1.0, 2.0], Some(Crs::new("EPSG:4326"))));
        assert!(matches!(codec.project(&point), Err(Error::Transformation(_))));
    }

    #[test]
    fn test_projection_with_transformer() {
        let options = GeometryOptions {
            output_crs: Some(Crs::new("EPSG:25832")),
            transformer: Some(Rc::new(Shift)),
            ..GeometryOptions::default()
        };
        let codec = GeometryCodec::for_version(GmlVersion::Gml31, options);
        let point = Geometry::Point(Point::new(vec![1.0, 2.0], Some(Crs::new("EPSG:4326"))));
        let projected = codec.project(&point).unwrap().unwrap();
        assert_eq!(projected.crs(), Some(&Crs::new("EPSG:25832")));

        let already = point.with_crs(Some(Crs::new("EPSG:25832")));
        assert!(codec.project(&already).unwrap().is_none());
    }

    #[test]
    fn test_dispatch_by_version() {
        for version in GmlVersion::ALL {
            let codec = GeometryCodec::for_version(version, GeometryOptions::default());
            assert_eq!(GeometryReader::version(&codec), version);
            assert_eq!(matches!(codec, GeometryCodec::Gml2(_)), version.is_gml2());
        }
    }
}
