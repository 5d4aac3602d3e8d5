//! Feature and feature collection reader
//!
//! Properties are read in document order. With an application schema the
//! property elements are matched against the feature type's declarations
//! in sequence, which also checks their cardinality; without one the content
//! decides: a geometry element makes a geometry property, any other element
//! a nested feature, and text a simple value.

use super::{Feature, FeatureCollection, FeatureMember, Property, PropertyValue};
use crate::crs::Crs;
use crate::error::Result;
use crate::geometry::codec::read_id;
use crate::geometry::{Envelope, Geometry, GeometryKind, GeometryReader, GeometryReference};
use crate::namespaces::{QName, EXTRA_PROPS_NS, WFS_20_NS, WFS_NS, XLINK_NS, XSI_NS};
use crate::reference::{DocumentIdContext, GmlObject, ObjectCategory};
use crate::schema::{ApplicationSchema, FeatureType, PropertyDecl, PropertyKind};
use crate::version::GmlVersion;
use crate::xml::{XmlCursor, XmlEvent};
use std::rc::Rc;
use tracing::{debug, warn};

/// Properties every GML feature may carry regardless of its type
const STANDARD_PROPERTIES: &[&str] = &[
    "metaDataProperty",
    "description",
    "descriptionReference",
    "identifier",
    "name",
    "boundedBy",
    "location",
];

/// Walks a feature type's declarations in step with the property elements
struct DeclarationSequence<'s> {
    feature_type: &'s FeatureType,
    index: usize,
    count: u32,
}

impl<'s> DeclarationSequence<'s> {
    fn new(feature_type: &'s FeatureType) -> Self {
        Self {
            feature_type,
            index: 0,
            count: 0,
        }
    }

    fn decls(&self) -> &'s [PropertyDecl] {
        &self.feature_type.properties
    }

    // first declaration at or after the current one that is not satisfied
    fn missing_before(&self, end: usize) -> Option<&'s PropertyDecl> {
        (self.index..end).find_map(|i| {
            let count = if i == self.index { self.count } else { 0 };
            let decl = &self.decls()[i];
            decl.occurs.is_missing(count).then_some(decl)
        })
    }

    /// Match the next property element; returns its declaration and a
    /// description of any violation
    fn accept(&mut self, name: &QName) -> (Option<&'s PropertyDecl>, Option<String>) {
        let decls = self.decls();
        let Some(position) = (self.index..decls.len()).find(|&i| &decls[i].name == name) else {
            return (
                None,
                Some(format!(
                    "Property '{}' is not allowed here for feature type '{}'.",
                    name, self.feature_type.name
                )),
            );
        };

        let mut violation = self.missing_before(position).map(|decl| {
            format!(
                "Property '{}' is mandatory for feature type '{}'.",
                decl.name, self.feature_type.name
            )
        });
        if position != self.index {
            self.index = position;
            self.count = 0;
        }
        self.count += 1;

        let decl = &decls[position];
        if violation.is_none() && decl.occurs.is_exceeded(self.count) {
            violation = Some(format!(
                "Property '{}' occurs more than {} times in feature type '{}'.",
                decl.name,
                decl.occurs.max.unwrap_or(u32::MAX),
                self.feature_type.name
            ));
        }
        (Some(decl), violation)
    }

    fn finish(&self) -> Option<String> {
        self.missing_before(self.decls().len()).map(|decl| {
            format!(
                "Property '{}' is mandatory for feature type '{}'.",
                decl.name, self.feature_type.name
            )
        })
    }
}

/// One step through a feature collection
#[derive(Debug)]
pub(crate) enum CollectionEvent {
    /// A member feature or member reference
    Member(FeatureMember),
    /// The collection's `gml:boundedBy`
    BoundedBy(Option<Envelope>),
    /// Any other collection property
    Property(Property),
    /// The collection's end tag
    End,
}

/// Position inside a collection being read
#[derive(Debug, Clone)]
pub(crate) struct CollectionState {
    pub(crate) name: QName,
    pub(crate) id: Option<String>,
    pub(crate) crs: Option<Crs>,
    array: Option<QName>,
}

/// Reads features of one GML version
#[derive(Debug, Clone)]
pub struct FeatureReader {
    version: GmlVersion,
    geometry: Rc<dyn GeometryReader>,
    schema: Option<Rc<ApplicationSchema>>,
    lax: bool,
}

impl FeatureReader {
    /// Create a reader that hands geometry elements to `geometry`
    pub fn new(version: GmlVersion, geometry: Rc<dyn GeometryReader>) -> Self {
        Self {
            version,
            geometry,
            schema: None,
            lax: false,
        }
    }

    /// Use an application schema
    pub fn with_schema(mut self, schema: Option<Rc<ApplicationSchema>>) -> Self {
        self.schema = schema;
        self
    }

    /// Downgrade schema violations to warnings
    pub fn with_lax(mut self, lax: bool) -> Self {
        self.lax = lax;
        self
    }

    /// GML version handled
    pub fn version(&self) -> GmlVersion {
        self.version
    }

    /// The application schema in use
    pub fn schema(&self) -> Option<&ApplicationSchema> {
        self.schema.as_deref()
    }

    /// The geometry reader in use
    pub fn geometry_reader(&self) -> &dyn GeometryReader {
        self.geometry.as_ref()
    }

    fn ns(&self) -> &'static str {
        self.version.namespace()
    }

    /// Whether the schema declares `name` as a feature element
    pub fn is_feature_element(&self, name: &QName) -> bool {
        self.schema
            .as_ref()
            .and_then(|s| s.feature_type(name))
            .map(|ft| !ft.is_abstract)
            .unwrap_or(false)
    }

    /// Whether `name` is a feature collection element.
    ///
    /// `gml:FeatureCollection` and the WFS collections always are, anything
    /// else only if the schema classifies it as one.
    pub fn is_collection_element(&self, name: &QName) -> bool {
        if name.is(self.ns(), "FeatureCollection")
            || name.is(WFS_NS, "FeatureCollection")
            || name.is(WFS_20_NS, "FeatureCollection")
        {
            return true;
        }
        self.schema
            .as_ref()
            .map(|s| s.is_feature_collection_element(name, self.version))
            .unwrap_or(false)
    }

    fn is_standard_property(&self, name: &QName) -> bool {
        name.in_namespace(self.ns()) && STANDARD_PROPERTIES.contains(&name.local_name.as_str())
    }

    // report a schema violation, or just log it in lax mode
    fn violation(&self, cursor: &XmlCursor<'_>, message: String) -> Result<()> {
        if self.lax {
            warn!("{}", message);
            Ok(())
        } else {
            Err(cursor.parse_error(message))
        }
    }

    fn read_object_id(&self, cursor: &XmlCursor<'_>) -> Result<Option<String>> {
        let id = match self.version {
            GmlVersion::Gml2 => cursor.attribute("fid"),
            _ => cursor
                .attribute_ns(self.ns(), "id")
                .or_else(|| cursor.attribute("fid")),
        };
        read_id(cursor, id.filter(|id| !id.is_empty()), self.lax)
    }

    /// Parse the feature at the cursor and register it.
    ///
    /// `crs` is the default CRS for geometries without `srsName`; a
    /// `gml:boundedBy` with a CRS replaces it for the following properties.
    /// Leaves the cursor on the feature's end tag.
    pub fn parse_feature(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
    ) -> Result<Rc<Feature>> {
        let name = cursor.require_start()?.clone();
        let id = self.read_object_id(cursor)?;
        debug!(feature = %name, id = ?id, "parsing feature");

        let feature_type = self.schema.as_ref().and_then(|s| s.feature_type(&name));
        if let Some(ft) = feature_type {
            if ft.is_abstract {
                self.violation(cursor, format!("Feature type '{}' is abstract.", name))?;
            }
        }
        let mut sequence = feature_type.map(DeclarationSequence::new);

        let mut feature = Feature::new(name.clone());
        feature.id = id;
        let mut active_crs = crs.cloned();

        loop {
            cursor.next_tag()?;
            if cursor.is_end() {
                break;
            }
            let property_name = cursor.require_start()?.clone();

            if property_name.in_namespace(EXTRA_PROPS_NS) {
                let value = self.read_untyped(cursor, ids, &property_name, active_crs.as_ref())?;
                feature.extra_properties.push(Property::new(property_name, value));
                continue;
            }

            let mut decl = None;
            if let Some(sequence) = sequence.as_mut() {
                if !self.is_standard_property(&property_name) {
                    let (found, violation) = sequence.accept(&property_name);
                    if let Some(message) = violation {
                        self.violation(cursor, message)?;
                    }
                    decl = found;
                }
            }

            let property = self.parse_property(cursor, ids, &property_name, decl, active_crs.as_ref())?;
            if property_name.is(self.ns(), "boundedBy") {
                if let PropertyValue::Envelope(envelope) = &property.value {
                    if let Some(envelope_crs) = &envelope.crs {
                        debug!(crs = %envelope_crs, "default CRS from boundedBy");
                        active_crs = Some(envelope_crs.clone());
                    }
                }
            }
            feature.properties.push(property);
        }
        cursor.require_end(&name)?;

        if let Some(message) = sequence.as_ref().and_then(DeclarationSequence::finish) {
            self.violation(cursor, message)?;
        }

        let feature = Rc::new(feature);
        ids.register_object(GmlObject::Feature(Rc::clone(&feature)))
            .map_err(|e| cursor.locate(e))?;
        Ok(feature)
    }

    /// Parse the property element at the cursor; leaves the cursor on its
    /// end tag
    pub fn parse_property(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        decl: Option<&PropertyDecl>,
        crs: Option<&Crs>,
    ) -> Result<Property> {
        if cursor.attribute_ns(XSI_NS, "nil").map(str::trim) == Some("true") {
            if let Some(decl) = decl {
                if !decl.nillable {
                    self.violation(cursor, format!("Property '{}' is not nillable.", name))?;
                }
            }
            cursor.skip_element()?;
            return Ok(Property::nil(name.clone()));
        }

        if let Some(href) = cursor.attribute_ns(XLINK_NS, "href").map(str::to_string) {
            let value = self.read_reference(cursor, ids, &href, decl)?;
            cursor.skip_element()?;
            return Ok(Property::new(name.clone(), value));
        }

        let value = match decl.map(|d| &d.kind) {
            // gml:boundedBy is an envelope or a null extent, whatever the schema says
            _ if name.is(self.ns(), "boundedBy") => match self.read_bounded_by(cursor, crs)? {
                Some(envelope) => PropertyValue::Envelope(envelope),
                None => PropertyValue::Empty,
            },
            Some(PropertyKind::Simple(primitive)) => {
                let text = cursor.element_text()?;
                if let Err(message) = primitive.check(&text) {
                    self.violation(cursor, format!("Invalid value for property '{}': {}", name, message))?;
                }
                if text.is_empty() {
                    PropertyValue::Empty
                } else {
                    PropertyValue::Text(text)
                }
            }
            Some(PropertyKind::Code) => {
                let code_space = cursor.attribute("codeSpace").map(str::to_string);
                PropertyValue::Code {
                    code: cursor.element_text()?,
                    code_space,
                }
            }
            Some(PropertyKind::Measure) => {
                let uom = cursor.attribute("uom").map(str::to_string);
                let text = cursor.element_text()?;
                match text.parse::<f64>() {
                    Ok(value) => PropertyValue::Measure { value, uom },
                    Err(_) => {
                        self.violation(
                            cursor,
                            format!("Value '{}' of property '{}' is not a valid measure.", text, name),
                        )?;
                        PropertyValue::Text(text)
                    }
                }
            }
            Some(PropertyKind::Geometry(kind)) => self.read_geometry_property(cursor, ids, name, *kind, crs)?,
            Some(PropertyKind::Envelope) => match self.read_bounded_by(cursor, crs)? {
                Some(envelope) => PropertyValue::Envelope(envelope),
                None => PropertyValue::Empty,
            },
            Some(PropertyKind::Feature { value_type }) => {
                self.read_feature_property(cursor, ids, name, value_type.as_ref(), crs)?
            }
            Some(PropertyKind::FeatureMember) => self.read_feature_property(cursor, ids, name, None, crs)?,
            None => self.read_untyped(cursor, ids, name, crs)?,
        };
        Ok(Property::new(name.clone(), value))
    }

    fn read_reference(
        &self,
        cursor: &XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        href: &str,
        decl: Option<&PropertyDecl>,
    ) -> Result<PropertyValue> {
        let kind = decl.map(|d| &d.kind);
        let category = match kind {
            Some(PropertyKind::Geometry(_)) => ObjectCategory::Geometry,
            Some(PropertyKind::Feature { .. }) | Some(PropertyKind::FeatureMember) => ObjectCategory::Feature,
            _ => ObjectCategory::Any,
        };
        let reference = ids
            .create_reference(href, category)
            .map_err(|e| cursor.locate(e))?;
        Ok(match kind {
            Some(PropertyKind::Geometry(kind)) => PropertyValue::Geometry(Rc::new(Geometry::Reference(
                GeometryReference { kind: *kind, reference },
            ))),
            _ => PropertyValue::Reference(reference),
        })
    }

    fn read_geometry_property(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        expected: GeometryKind,
        crs: Option<&Crs>,
    ) -> Result<PropertyValue> {
        cursor.next_tag()?;
        if cursor.is_end() {
            // empty geometry properties are valid
            return Ok(PropertyValue::Empty);
        }
        let element = cursor.require_start()?.clone();
        if !self.geometry.is_geometry_element(&element) {
            return Err(cursor.parse_error(format!(
                "Property '{}' expects a geometry, found '{}'.",
                name, element
            )));
        }
        let geometry = self.read_geometry(cursor, ids, crs)?;
        if !expected.accepts(geometry.kind()) {
            self.violation(
                cursor,
                format!(
                    "Value for geometry property '{}' is invalid. A {} is not allowed here, expected a {}.",
                    name,
                    geometry.kind(),
                    expected
                ),
            )?;
        }
        cursor.next_tag()?;
        cursor.require_end(name)?;
        Ok(PropertyValue::Geometry(geometry))
    }

    fn read_geometry(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
    ) -> Result<Rc<Geometry>> {
        let geometry = Rc::new(self.geometry.parse(cursor, ids, crs)?);
        if geometry.id().is_some() {
            ids.register_object(GmlObject::Geometry(Rc::clone(&geometry)))
                .map_err(|e| cursor.locate(e))?;
        }
        Ok(geometry)
    }

    fn read_feature_property(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        value_type: Option<&QName>,
        crs: Option<&Crs>,
    ) -> Result<PropertyValue> {
        cursor.next_tag()?;
        if cursor.is_end() {
            // empty feature properties are valid
            return Ok(PropertyValue::Empty);
        }
        let element = cursor.require_start()?.clone();
        if let (Some(expected), Some(schema)) = (value_type, self.schema.as_ref()) {
            if !schema.substitutes_for(&element, expected) {
                self.violation(
                    cursor,
                    format!(
                        "Property '{}' expects a '{}' feature, found '{}'.",
                        name, expected, element
                    ),
                )?;
            }
        }
        let feature = self.parse_feature(cursor, ids, crs)?;
        cursor.next_tag()?;
        cursor.require_end(name)?;
        Ok(PropertyValue::Feature(feature))
    }

    // property without declaration: the content decides
    fn read_untyped(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        crs: Option<&Crs>,
    ) -> Result<PropertyValue> {
        if let Some(href) = cursor.attribute_ns(XLINK_NS, "href").map(str::to_string) {
            let value = self.read_reference(cursor, ids, &href, None)?;
            cursor.skip_element()?;
            return Ok(value);
        }

        let code_space = cursor.attribute("codeSpace").map(str::to_string);
        let uom = cursor.attribute("uom").map(str::to_string);
        let mut text = String::new();
        loop {
            match cursor.next()? {
                XmlEvent::Characters(chunk) => text.push_str(chunk),
                XmlEvent::EndElement(_) => break,
                XmlEvent::StartElement(_) => {
                    if !text.trim().is_empty() {
                        return Err(cursor.parse_error(format!(
                            "Mixed content in property '{}' is not supported.",
                            name
                        )));
                    }
                    let value = self.read_inline_value(cursor, ids, crs)?;
                    cursor.next_tag()?;
                    cursor.require_end(name)?;
                    return Ok(value);
                }
                XmlEvent::StartDocument | XmlEvent::EndDocument => {
                    return Err(cursor.parse_error("Unexpected end of document"));
                }
            }
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return Ok(PropertyValue::Empty);
        }
        if code_space.is_some() || name.is(self.ns(), "identifier") {
            return Ok(PropertyValue::Code { code: text, code_space });
        }
        if uom.is_some() {
            if let Ok(value) = text.parse::<f64>() {
                return Ok(PropertyValue::Measure { value, uom });
            }
        }
        Ok(PropertyValue::Text(text))
    }

    fn read_inline_value(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
    ) -> Result<PropertyValue> {
        let element = cursor.require_start()?.clone();
        if self.geometry.is_geometry_element(&element) {
            return self.read_geometry(cursor, ids, crs).map(PropertyValue::Geometry);
        }
        if self.geometry.is_envelope_element(&element) {
            return self
                .geometry
                .parse_envelope(cursor, crs)
                .map(PropertyValue::Envelope);
        }
        self.parse_feature(cursor, ids, crs).map(PropertyValue::Feature)
    }

    /// Read a `gml:boundedBy` property; leaves the cursor on its end tag
    pub fn read_bounded_by(&self, cursor: &mut XmlCursor<'_>, crs: Option<&Crs>) -> Result<Option<Envelope>> {
        let property = cursor.require_start()?.clone();
        cursor.next_tag()?;
        if cursor.is_end() {
            return Ok(None);
        }
        let element = cursor.require_start()?.clone();
        let envelope = if self.geometry.is_envelope_element(&element) {
            Some(self.geometry.parse_envelope(cursor, crs)?)
        } else if element.in_namespace(self.ns()) && element.local_name.eq_ignore_ascii_case("null") {
            cursor.skip_element()?;
            None
        } else {
            return Err(cursor.parse_error(format!(
                "Unexpected element '{}' in '{}'. Expected an envelope.",
                element, property
            )));
        };
        cursor.next_tag()?;
        cursor.require_end(&property)?;
        Ok(envelope)
    }

    fn is_member_property(&self, collection: &QName, name: &QName) -> bool {
        if name.is(self.ns(), "featureMember") || name.is(WFS_20_NS, "member") {
            return true;
        }
        if !self.version.is_pre_32() && name.is(self.ns(), "member") {
            return true;
        }
        self.schema
            .as_ref()
            .and_then(|s| s.feature_type(collection))
            .and_then(|ft| ft.property(name))
            .map(|decl| match &decl.kind {
                PropertyKind::FeatureMember => true,
                PropertyKind::Feature { .. } => decl.occurs.is_multiple(),
                _ => false,
            })
            .unwrap_or(false)
    }

    fn is_member_array(&self, name: &QName) -> bool {
        !self.version.is_gml2() && name.is(self.ns(), "featureMembers")
    }

    /// Enter the collection at the cursor
    pub(crate) fn start_collection(&self, cursor: &XmlCursor<'_>, crs: Option<&Crs>) -> Result<CollectionState> {
        let name = cursor.require_start()?.clone();
        Ok(CollectionState {
            id: self.read_object_id(cursor)?,
            name,
            crs: crs.cloned(),
            array: None,
        })
    }

    /// Read up to the next member, collection property or the end tag
    pub(crate) fn next_collection_event(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        state: &mut CollectionState,
    ) -> Result<CollectionEvent> {
        loop {
            if let Some(array) = state.array.clone() {
                cursor.next_tag()?;
                if cursor.is_end() {
                    cursor.require_end(&array)?;
                    state.array = None;
                    continue;
                }
                let feature = self.parse_feature(cursor, ids, state.crs.as_ref())?;
                return Ok(CollectionEvent::Member(FeatureMember::Inline(feature)));
            }

            cursor.next_tag()?;
            if cursor.is_end() {
                cursor.require_end(&state.name)?;
                return Ok(CollectionEvent::End);
            }
            let child = cursor.require_start()?.clone();

            if self.is_member_array(&child) {
                state.array = Some(child);
                continue;
            }
            if self.is_member_property(&state.name, &child) {
                return self.read_member(cursor, ids, &child, state).map(CollectionEvent::Member);
            }
            if child.is(self.ns(), "boundedBy") {
                let envelope = self.read_bounded_by(cursor, state.crs.as_ref())?;
                if let Some(envelope_crs) = envelope.as_ref().and_then(|e| e.crs.clone()) {
                    state.crs = Some(envelope_crs);
                }
                return Ok(CollectionEvent::BoundedBy(envelope));
            }
            let decl = self
                .schema
                .as_ref()
                .and_then(|s| s.feature_type(&state.name))
                .and_then(|ft| ft.property(&child));
            let property = self.parse_property(cursor, ids, &child, decl, state.crs.as_ref())?;
            return Ok(CollectionEvent::Property(property));
        }
    }

    fn read_member(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        property: &QName,
        state: &CollectionState,
    ) -> Result<FeatureMember> {
        if let Some(href) = cursor.attribute_ns(XLINK_NS, "href").map(str::to_string) {
            let reference = ids
                .create_reference(&href, ObjectCategory::Feature)
                .map_err(|e| cursor.locate(e))?;
            cursor.skip_element()?;
            return Ok(FeatureMember::Reference(reference));
        }
        cursor.next_tag()?;
        if cursor.is_end() {
            return Err(cursor.parse_error(format!("Member property '{}' is empty.", property)));
        }
        let feature = self.parse_feature(cursor, ids, state.crs.as_ref())?;
        cursor.next_tag()?;
        cursor.require_end(property)?;
        Ok(FeatureMember::Inline(feature))
    }

    /// Parse the whole collection at the cursor and register it.
    ///
    /// Leaves the cursor on the collection's end tag.
    pub fn parse_feature_collection(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        crs: Option<&Crs>,
    ) -> Result<Rc<FeatureCollection>> {
        let mut state = self.start_collection(cursor, crs)?;
        let mut collection = FeatureCollection::new(state.name.clone());
        collection.id = state.id.clone();

        loop {
            match self.next_collection_event(cursor, ids, &mut state)? {
                CollectionEvent::Member(member) => collection.members.push(member),
                CollectionEvent::BoundedBy(envelope) => collection.bounded_by = envelope,
                CollectionEvent::Property(property) => collection.properties.push(property),
                CollectionEvent::End => break,
            }
        }
        debug!(collection = %collection.name, members = collection.len(), "parsed feature collection");

        let collection = Rc::new(collection);
        ids.register_object(GmlObject::FeatureCollection(Rc::clone(&collection)))
            .map_err(|e| cursor.locate(e))?;
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::geometry::{GeometryCodec, GeometryOptions};
    use crate::schema::{Occurs, PrimitiveType};

    const APP: &str = "urn:app";

    fn app(local: &str) -> QName {
        QName::namespaced(APP, local)
    }

    fn reader(version: GmlVersion, schema: Option<ApplicationSchema>, lax: bool) -> FeatureReader {
        let geometry = Rc::new(GeometryCodec::for_version(
            version,
            GeometryOptions {
                lax,
                ..GeometryOptions::default()
            },
        ));
        FeatureReader::new(version, geometry)
            .with_schema(schema.map(Rc::new))
            .with_lax(lax)
    }

    fn parse(reader: &FeatureReader, xml: &str) -> Result<(Rc<Feature>, DocumentIdContext)> {
        let mut ids = DocumentIdContext::new(reader.version());
        let mut cursor = XmlCursor::from_str(xml);
        cursor.next_tag()?;
        let feature = reader.parse_feature(&mut cursor, &mut ids, None)?;
        Ok((feature, ids))
    }

    fn road_schema() -> ApplicationSchema {
        ApplicationSchema::new().with_feature_type(
            FeatureType::new(app("Road"))
                .with_property(PropertyDecl::new(app("name"), PropertyKind::Simple(PrimitiveType::String)))
                .with_property(
                    PropertyDecl::new(app("lanes"), PropertyKind::Simple(PrimitiveType::Integer))
                        .with_occurs(Occurs::optional()),
                )
                .with_property(PropertyDecl::new(
                    app("centerline"),
                    PropertyKind::Geometry(GeometryKind::Curve),
                )),
        )
    }

    #[test]
    fn test_structural_inference() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml/3.2" gml:id="R1">
            <gml:name codeSpace="urn:names">A1</gml:name>
            <app:lanes>4</app:lanes>
            <app:length uom="m">1200.5</app:length>
            <app:centerline><gml:LineString srsName="EPSG:4326"><gml:posList>0 0 1 1</gml:posList></gml:LineString></app:centerline>
            <app:owner><app:Company gml:id="C1"><app:name>ACME</app:name></app:Company></app:owner>
            <app:note/>
        </app:Road>"#;
        let (feature, ids) = parse(&reader(GmlVersion::Gml32, None, false), xml).unwrap();

        assert_eq!(feature.id.as_deref(), Some("R1"));
        assert_eq!(feature.properties.len(), 6);
        assert!(matches!(
            &feature.properties[0].value,
            PropertyValue::Code { code, code_space: Some(space) } if code == "A1" && space == "urn:names"
        ));
        assert_eq!(feature.property(&app("lanes")).unwrap().value.as_text(), Some("4"));
        assert!(matches!(
            feature.property(&app("length")).unwrap().value,
            PropertyValue::Measure { value, .. } if value == 1200.5
        ));
        let geometry = feature.property(&app("centerline")).unwrap().value.as_geometry().unwrap();
        assert_eq!(geometry.kind(), GeometryKind::LineString);
        let owner = feature.property(&app("owner")).unwrap().value.as_feature().unwrap();
        assert_eq!(owner.id.as_deref(), Some("C1"));
        assert!(matches!(feature.property(&app("note")).unwrap().value, PropertyValue::Empty));

        assert!(ids.get_object("R1").is_some());
        assert!(ids.get_object("C1").is_some());
    }

    #[test]
    fn test_schema_driven() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml">
            <app:name>A1</app:name>
            <app:centerline><gml:LineString srsName="EPSG:4326"><gml:posList>0 0 1 1</gml:posList></gml:LineString></app:centerline>
        </app:Road>"#;
        let (feature, _) = parse(&reader(GmlVersion::Gml31, Some(road_schema()), false), xml).unwrap();
        assert_eq!(feature.properties.len(), 2);
    }

    #[test]
    fn test_mandatory_property_missing() {
        let xml = r#"<app:Road xmlns:app="urn:app"><app:lanes>2</app:lanes></app:Road>"#;
        let err = parse(&reader(GmlVersion::Gml31, Some(road_schema()), false), xml).unwrap_err();
        assert!(err.to_string().contains("is mandatory"), "{}", err);
    }

    #[test]
    fn test_invalid_integer_strict_and_lax() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml">
            <app:name>A1</app:name><app:lanes>many</app:lanes>
            <app:centerline/>
        </app:Road>"#;
        let err = parse(&reader(GmlVersion::Gml31, Some(road_schema()), false), xml).unwrap_err();
        assert!(err.is_parse());

        let (feature, _) = parse(&reader(GmlVersion::Gml31, Some(road_schema()), true), xml).unwrap();
        assert_eq!(feature.property(&app("lanes")).unwrap().value.as_text(), Some("many"));
    }

    #[test]
    fn test_too_many_occurrences() {
        let xml = r#"<app:Road xmlns:app="urn:app"><app:name>A</app:name><app:name>B</app:name><app:centerline/></app:Road>"#;
        let err = parse(&reader(GmlVersion::Gml31, Some(road_schema()), false), xml).unwrap_err();
        assert!(err.to_string().contains("occurs more than 1 times"), "{}", err);
    }

    #[test]
    fn test_wrong_geometry_kind() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml">
            <app:name>A1</app:name>
            <app:centerline><gml:Point srsName="EPSG:4326"><gml:pos>1 2</gml:pos></gml:Point></app:centerline>
        </app:Road>"#;
        let err = parse(&reader(GmlVersion::Gml31, Some(road_schema()), false), xml).unwrap_err();
        assert!(err.to_string().contains("is not allowed here"), "{}", err);
    }

    #[test]
    fn test_gml2_fid_and_nil() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" fid="R7">
            <app:name xsi:nil="true"/>
        </app:Road>"#;
        let (feature, _) = parse(&reader(GmlVersion::Gml2, None, false), xml).unwrap();
        assert_eq!(feature.id.as_deref(), Some("R7"));
        assert!(feature.properties[0].nil);
    }

    #[test]
    fn test_invalid_feature_id() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml/3.2" gml:id="1abc"/>"#;
        assert!(parse(&reader(GmlVersion::Gml32, None, false), xml).is_err());
    }

    #[test]
    fn test_bounded_by_sets_default_crs() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml">
            <gml:boundedBy><gml:Envelope srsName="EPSG:25832"><gml:lowerCorner>0 0</gml:lowerCorner><gml:upperCorner>5 5</gml:upperCorner></gml:Envelope></gml:boundedBy>
            <app:geom><gml:Point><gml:pos>1 2</gml:pos></gml:Point></app:geom>
        </app:Road>"#;
        let (feature, _) = parse(&reader(GmlVersion::Gml31, None, false), xml).unwrap();
        let geometry = feature.property(&app("geom")).unwrap().value.as_geometry().unwrap();
        assert_eq!(geometry.crs().map(|c| c.name()), Some("EPSG:25832"));
        assert!(feature.bounded_by().is_some());
    }

    #[test]
    fn test_null_bounded_by_all_versions() {
        for version in GmlVersion::ALL {
            let null = if version.is_gml2() { "null" } else { "Null" };
            let xml = format!(
                r#"<app:Road xmlns:app="urn:app" xmlns:gml="{ns}"><gml:boundedBy><gml:{null}>missing</gml:{null}></gml:boundedBy><app:name>A1</app:name></app:Road>"#,
                ns = version.namespace(),
                null = null
            );
            let (feature, _) = parse(&reader(version, None, false), &xml).unwrap();
            let bounded_by = feature.property(&QName::new(Some(version.namespace()), "boundedBy")).unwrap();
            assert!(matches!(bounded_by.value, PropertyValue::Empty), "{}", version);
            assert!(feature.bounded_by().is_none());
            assert_eq!(feature.properties.len(), 2);
        }
    }

    #[test]
    fn test_missing_crs_is_crs_error() {
        let xml = r#"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml">
            <app:geom><gml:Point><gml:pos>1 2</gml:pos></gml:Point></app:geom>
        </app:Road>"#;
        let err = parse(&reader(GmlVersion::Gml31, None, false), xml).unwrap_err();
        assert!(err.is_crs());
    }

    #[test]
    fn test_collection_with_member_array() {
        let xml = r##"<gml:FeatureCollection xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml"
                xmlns:xlink="http://www.w3.org/1999/xlink" gml:id="FC">
            <gml:boundedBy><gml:Envelope srsName="EPSG:4326"><gml:pos>0 0</gml:pos><gml:pos>9 9</gml:pos></gml:Envelope></gml:boundedBy>
            <gml:featureMember><app:Road gml:id="A"/></gml:featureMember>
            <gml:featureMembers><app:Road gml:id="B"/><app:Road gml:id="C"/></gml:featureMembers>
            <gml:featureMember xlink:href="#A"/>
        </gml:FeatureCollection>"##;
        let reader = reader(GmlVersion::Gml31, None, false);
        let mut ids = DocumentIdContext::new(GmlVersion::Gml31);
        let mut cursor = XmlCursor::from_str(xml);
        cursor.next_tag().unwrap();
        assert!(reader.is_collection_element(cursor.name().unwrap()));

        let collection = reader.parse_feature_collection(&mut cursor, &mut ids, None).unwrap();
        assert_eq!(collection.id.as_deref(), Some("FC"));
        assert!(collection.bounded_by.is_some());
        let member_ids: Vec<_> = collection.members.iter().map(|m| m.id().unwrap().to_string()).collect();
        assert_eq!(member_ids, vec!["A", "B", "C", "A"]);
        assert!(Rc::ptr_eq(
            &collection.members[0].feature().unwrap(),
            &collection.members[3].feature().unwrap()
        ));
        assert!(cursor.is_end());
    }

    #[test]
    fn test_duplicate_feature_id_strict() {
        let xml = r#"<gml:FeatureCollection xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml">
            <gml:featureMember><app:Road gml:id="A"/></gml:featureMember>
            <gml:featureMember><app:Road gml:id="A"/></gml:featureMember>
        </gml:FeatureCollection>"#;
        let reader = reader(GmlVersion::Gml31, None, false);
        let mut ids = DocumentIdContext::new(GmlVersion::Gml31).with_strict_ids(true);
        let mut cursor = XmlCursor::from_str(xml);
        cursor.next_tag().unwrap();
        let err = reader.parse_feature_collection(&mut cursor, &mut ids, None).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));
    }
}
