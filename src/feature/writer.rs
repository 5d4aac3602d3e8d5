//! Feature and feature collection writer
//!
//! Nested features are written inline up to the configured xlink depth and
//! as `xlink:href` stubs below it. A feature or geometry that was already
//! written in the session is never written twice; later occurrences become
//! local `#id` references.

use super::{Feature, FeatureCollection, FeatureMember, Property, PropertyValue};
use crate::error::Result;
use crate::geometry::{CoordinateFormatter, Envelope, Geometry, GeometryWriter};
use crate::namespaces::{QName, GML_32_NS, GML_PRE_32_NS, XLINK_NS, XSI_NS};
use crate::reference::{DocumentIdContext, GmlObject, GmlReference, ReferenceResolver};
use crate::version::GmlVersion;
use crate::xml::XmlEmitter;
use std::rc::Rc;
use tracing::{debug, warn};

/// Placeholder for the object id in remote xlink templates
pub const ID_PLACEHOLDER: &str = "{}";

/// Settings of a [`FeatureWriter`]
#[derive(Debug, Clone)]
pub struct FeatureWriterOptions {
    /// Nested feature levels written inline; `None` writes all of them inline
    pub xlink_depth: Option<u32>,
    /// URI for features below the xlink depth, `{}` stands for the id.
    /// Without a template every nested feature is written inline.
    pub remote_xlink_template: Option<String>,
    /// Properties written for top-level features; `None` writes all
    pub projection: Option<Vec<QName>>,
    /// Write [`Feature::extra_properties`]
    pub export_extra_properties: bool,
    /// Write a computed `gml:boundedBy` for features without one
    pub generate_bounded_by: bool,
    /// Writes `gml:MeasureType` values, like ordinates
    pub formatter: CoordinateFormatter,
    /// Fetches remote references that are still within the xlink depth.
    /// Without one remote references are always written as stubs.
    pub resolver: Option<Rc<dyn ReferenceResolver>>,
}

impl Default for FeatureWriterOptions {
    fn default() -> Self {
        Self {
            xlink_depth: None,
            remote_xlink_template: Some("#{}".to_string()),
            projection: None,
            export_extra_properties: false,
            generate_bounded_by: false,
            formatter: CoordinateFormatter::new(),
            resolver: None,
        }
    }
}

/// Writes features of one GML version
#[derive(Debug, Clone)]
pub struct FeatureWriter {
    version: GmlVersion,
    geometry: Rc<dyn GeometryWriter>,
    options: FeatureWriterOptions,
}

impl FeatureWriter {
    /// Create a writer that hands geometries to `geometry`
    pub fn new(version: GmlVersion, geometry: Rc<dyn GeometryWriter>, options: FeatureWriterOptions) -> Self {
        Self {
            version,
            geometry,
            options,
        }
    }

    /// GML version written
    pub fn version(&self) -> GmlVersion {
        self.version
    }

    /// Settings in use
    pub fn options(&self) -> &FeatureWriterOptions {
        &self.options
    }

    fn ns(&self) -> &'static str {
        self.version.namespace()
    }

    // GML names are moved to the namespace of the output version
    fn output_namespace<'n>(&self, name: &'n QName) -> Option<&'n str> {
        match name.namespace() {
            Some(ns) if ns == GML_PRE_32_NS || ns == GML_32_NS => Some(self.ns()),
            other => other,
        }
    }

    fn start(&self, emitter: &mut XmlEmitter<'_>, name: &QName) -> Result<()> {
        emitter.start_element(self.output_namespace(name), &name.local_name)
    }

    fn write_id(&self, emitter: &mut XmlEmitter<'_>, ids: &mut DocumentIdContext, id: Option<&str>) -> Result<()> {
        let Some(id) = id else {
            return Ok(());
        };
        if self.version.is_gml2() {
            emitter.attribute(None, "fid", id)?;
        } else {
            emitter.attribute(Some(self.ns()), "id", id)?;
        }
        ids.mark_exported(id);
        Ok(())
    }

    fn stub(&self, emitter: &mut XmlEmitter<'_>, name: &QName, href: &str) -> Result<()> {
        self.start(emitter, name)?;
        emitter.attribute(Some(XLINK_NS), "href", href)?;
        emitter.end_element()
    }

    /// Write a feature
    pub fn export_feature(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        feature: &Feature,
    ) -> Result<()> {
        self.write_feature(emitter, ids, feature, 0)
    }

    fn write_feature(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        feature: &Feature,
        level: u32,
    ) -> Result<()> {
        debug!(feature = %feature.name, id = ?feature.id, level, "writing feature");
        self.start(emitter, &feature.name)?;
        self.write_id(emitter, ids, feature.id.as_deref())?;

        let has_bounds = feature.bounded_by().is_some();
        if self.options.generate_bounded_by && !has_bounds {
            if let Some(envelope) = feature.envelope() {
                self.write_bounded_by(emitter, &envelope)?;
            }
        }

        for property in &feature.properties {
            if level == 0 && !self.is_projected(&property.name) {
                continue;
            }
            self.write_property(emitter, ids, property, level)?;
        }
        if self.options.export_extra_properties {
            for property in &feature.extra_properties {
                self.write_property(emitter, ids, property, level)?;
            }
        }
        emitter.end_element()
    }

    fn is_projected(&self, name: &QName) -> bool {
        match &self.options.projection {
            Some(names) => name.in_namespace(GML_PRE_32_NS) || name.in_namespace(GML_32_NS) || names.contains(name),
            None => true,
        }
    }

    fn write_bounded_by(&self, emitter: &mut XmlEmitter<'_>, envelope: &Envelope) -> Result<()> {
        emitter.start_element(Some(self.ns()), "boundedBy")?;
        self.geometry.export_envelope(emitter, envelope)?;
        emitter.end_element()
    }

    /// Write one property
    pub fn write_property(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        property: &Property,
        level: u32,
    ) -> Result<()> {
        let name = &property.name;
        if property.nil {
            self.start(emitter, name)?;
            emitter.attribute(Some(XSI_NS), "nil", "true")?;
            return emitter.end_element();
        }

        match &property.value {
            PropertyValue::Empty => {
                self.start(emitter, name)?;
                emitter.end_element()
            }
            PropertyValue::Text(text) => {
                self.start(emitter, name)?;
                emitter.characters(text)?;
                emitter.end_element()
            }
            PropertyValue::Code { code, code_space } => {
                self.start(emitter, name)?;
                if let (Some(space), false) = (code_space, self.version.is_gml2()) {
                    emitter.attribute(None, "codeSpace", space)?;
                }
                emitter.characters(code)?;
                emitter.end_element()
            }
            PropertyValue::Measure { value, uom } => {
                self.start(emitter, name)?;
                if let (Some(uom), false) = (uom, self.version.is_gml2()) {
                    emitter.attribute(None, "uom", uom)?;
                }
                emitter.characters(&self.options.formatter.format(*value))?;
                emitter.end_element()
            }
            PropertyValue::Geometry(geometry) => self.write_geometry_property(emitter, ids, name, geometry),
            PropertyValue::Envelope(envelope) => {
                self.start(emitter, name)?;
                self.geometry.export_envelope(emitter, envelope)?;
                emitter.end_element()
            }
            PropertyValue::Feature(feature) => self.write_feature_property(emitter, ids, name, feature, level),
            PropertyValue::Reference(reference) => self.write_reference(emitter, ids, name, reference, level),
        }
    }

    fn write_geometry_property(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        geometry: &Rc<Geometry>,
    ) -> Result<()> {
        let target = match geometry.as_ref() {
            Geometry::Reference(r) => match r.resolved() {
                Some(resolved) => resolved,
                None => return self.stub(emitter, name, r.reference.uri()),
            },
            _ => Rc::clone(geometry),
        };
        if let Some(id) = target.id() {
            if ids.is_object_exported(id) {
                return self.stub(emitter, name, &format!("#{}", id));
            }
        }
        self.start(emitter, name)?;
        self.geometry.export(emitter, ids, &target, None)?;
        emitter.end_element()
    }

    fn inline_allowed(&self, level: u32) -> bool {
        match (self.options.xlink_depth, &self.options.remote_xlink_template) {
            (_, None) | (None, _) => true,
            (Some(depth), Some(_)) => level < depth,
        }
    }

    fn write_feature_property(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        feature: &Feature,
        level: u32,
    ) -> Result<()> {
        let Some(id) = feature.id.as_deref() else {
            // nothing to refer to, so it goes inline
            self.start(emitter, name)?;
            self.write_feature(emitter, ids, feature, level + 1)?;
            return emitter.end_element();
        };
        if ids.is_object_exported(id) {
            return self.stub(emitter, name, &format!("#{}", id));
        }
        if self.inline_allowed(level) {
            self.start(emitter, name)?;
            self.write_feature(emitter, ids, feature, level + 1)?;
            return emitter.end_element();
        }
        let template = self.options.remote_xlink_template.as_deref().unwrap_or("#{}");
        self.stub(emitter, name, &template.replace(ID_PLACEHOLDER, id))
    }

    fn write_reference(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        reference: &GmlReference,
        level: u32,
    ) -> Result<()> {
        let target = if reference.is_local() {
            reference.object()
        } else {
            self.traverse(reference, level)
        };
        match target {
            Some(GmlObject::Feature(feature)) => self.write_feature_property(emitter, ids, name, &feature, level),
            Some(GmlObject::Geometry(geometry)) => self.write_geometry_property(emitter, ids, name, &geometry),
            _ => self.stub(emitter, name, reference.uri()),
        }
    }

    // remote targets are only fetched while they could still be written inline
    fn traverse(&self, reference: &GmlReference, level: u32) -> Option<GmlObject> {
        let resolver = self.options.resolver.as_ref()?;
        if !self.inline_allowed(level) {
            return None;
        }
        if let Some(object) = reference.object() {
            return Some(object);
        }
        match resolver.resolve(reference.uri(), None) {
            Ok(Some(object)) => {
                if let Err(err) = reference.resolve(object.clone()) {
                    warn!(href = reference.uri(), error = %err, "traversed reference points at the wrong kind of object");
                    return None;
                }
                Some(object)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(href = reference.uri(), error = %err, "remote reference not traversed");
                None
            }
        }
    }

    fn write_member(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        member: &FeatureMember,
    ) -> Result<()> {
        let property = QName::namespaced(self.ns(), "featureMember");
        match member {
            FeatureMember::Inline(feature) => self.write_member_feature(emitter, ids, &property, feature),
            FeatureMember::Reference(reference) => match reference.feature() {
                Some(feature) if reference.is_local() => {
                    self.write_member_feature(emitter, ids, &property, &feature)
                }
                _ => self.stub(emitter, &property, reference.uri()),
            },
        }
    }

    fn write_member_feature(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        property: &QName,
        feature: &Feature,
    ) -> Result<()> {
        if let Some(id) = feature.id.as_deref() {
            if ids.is_object_exported(id) {
                return self.stub(emitter, property, &format!("#{}", id));
            }
        }
        self.start(emitter, property)?;
        self.write_feature(emitter, ids, feature, 0)?;
        emitter.end_element()
    }

    /// Open a collection element and write its id, envelope and properties
    pub fn start_collection(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        name: &QName,
        id: Option<&str>,
        bounded_by: Option<&Envelope>,
        properties: &[Property],
    ) -> Result<()> {
        self.start(emitter, name)?;
        self.write_id(emitter, ids, id)?;
        match bounded_by {
            Some(envelope) => self.write_bounded_by(emitter, envelope)?,
            None if self.options.generate_bounded_by && self.version.is_pre_32() => {
                emitter.start_element(Some(self.ns()), "boundedBy")?;
                let null = if self.version.is_gml2() { "null" } else { "Null" };
                emitter.text_element(Some(self.ns()), null, "missing")?;
                emitter.end_element()?;
            }
            None => {}
        }
        for property in properties {
            self.write_property(emitter, ids, property, 0)?;
        }
        Ok(())
    }

    /// Write one collection member inside an open collection
    pub fn export_member(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        member: &FeatureMember,
    ) -> Result<()> {
        self.write_member(emitter, ids, member)
    }

    /// Write a whole feature collection
    pub fn export_collection(
        &self,
        emitter: &mut XmlEmitter<'_>,
        ids: &mut DocumentIdContext,
        collection: &FeatureCollection,
    ) -> Result<()> {
        let computed = match (&collection.bounded_by, self.options.generate_bounded_by) {
            (None, true) => collection.envelope(),
            _ => None,
        };
        let bounded_by = collection.bounded_by.as_ref().or(computed.as_ref());
        self.start_collection(
            emitter,
            ids,
            &collection.name,
            collection.id.as_deref(),
            bounded_by,
            &collection.properties,
        )?;
        for member in &collection.members {
            self.write_member(emitter, ids, member)?;
        }
        emitter.end_element()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::geometry::{GeometryCodec, GeometryOptions, Point};
    use crate::namespaces::PrefixBindings;
    use pretty_assertions::assert_eq;

    fn app(local: &str) -> QName {
        QName::namespaced("urn:app", local)
    }

    fn writer(version: GmlVersion, options: FeatureWriterOptions) -> FeatureWriter {
        let geometry = Rc::new(GeometryCodec::for_version(version, GeometryOptions::default()));
        FeatureWriter::new(version, geometry, options)
    }

    fn write(writer: &FeatureWriter, feature: &Feature) -> String {
        let mut out = Vec::new();
        let mut bindings = PrefixBindings::defaults_for(writer.version);
        bindings.bind("app", "urn:app");
        let mut emitter = XmlEmitter::new(&mut out, bindings);
        let mut ids = DocumentIdContext::new(writer.version);
        writer.export_feature(&mut emitter, &mut ids, feature).unwrap();
        emitter.finish().unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_measure_uses_ordinate_precision() {
        let feature = Feature::new(app("Parcel")).with_id("P1").with_property(Property::new(
            app("area"),
            PropertyValue::Measure {
                value: 1200.456789,
                uom: Some("m2".to_string()),
            },
        ));
        let options = FeatureWriterOptions {
            formatter: CoordinateFormatter::with_precision(2),
            ..FeatureWriterOptions::default()
        };
        let xml = write(&writer(GmlVersion::Gml32, options), &feature);
        assert!(xml.contains(r#"uom="m2">1200.46</app:area>"#), "{}", xml);

        let xml = write(&writer(GmlVersion::Gml32, FeatureWriterOptions::default()), &feature);
        assert!(xml.contains(">1200.456789</app:area>"), "{}", xml);
    }

    fn shared_feature() -> Feature {
        let owner = Rc::new(
            Feature::new(app("Company"))
                .with_id("C1")
                .with_property(Property::text(app("name"), "ACME")),
        );
        Feature::new(app("Road"))
            .with_id("R1")
            .with_property(Property::feature(app("owner"), Rc::clone(&owner)))
            .with_property(Property::feature(app("maintainer"), owner))
    }

    #[test]
    fn test_shared_feature_written_once() {
        let xml = write(
            &writer(
                GmlVersion::Gml32,
                FeatureWriterOptions {
                    xlink_depth: Some(1),
                    ..FeatureWriterOptions::default()
                },
            ),
            &shared_feature(),
        );
        assert_eq!(xml.matches("<app:Company").count(), 1);
        assert!(xml.contains("<app:maintainer xmlns:xlink="), "{}", xml);
        assert!(xml.contains(r##"xlink:href="#C1"/>"##), "{}", xml);
    }

    #[test]
    fn test_depth_zero_uses_template() {
        let xml = write(
            &writer(
                GmlVersion::Gml32,
                FeatureWriterOptions {
                    xlink_depth: Some(0),
                    remote_xlink_template: Some("http://example.com/features/{}".to_string()),
                    ..FeatureWriterOptions::default()
                },
            ),
            &shared_feature(),
        );
        assert!(!xml.contains("<app:Company"));
        assert!(xml.contains(r#"xlink:href="http://example.com/features/C1"/>"#), "{}", xml);
        assert_eq!(xml.matches("xlink:href").count(), 2);
    }

    #[test]
    fn test_simple_feature_gml2() {
        let feature = Feature::new(app("Road"))
            .with_id("R1")
            .with_property(Property::new(
                app("class"),
                PropertyValue::Code {
                    code: "A".to_string(),
                    code_space: Some("urn:classes".to_string()),
                },
            ))
            .with_property(Property::nil(app("lanes")))
            .with_property(Property::geometry(
                app("geom"),
                Geometry::Point(Point::new(vec![1.0, 2.0], Some(Crs::new("EPSG:4326")))),
            ));
        let xml = write(&writer(GmlVersion::Gml2, FeatureWriterOptions::default()), &feature);
        assert_eq!(
            xml,
            concat!(
                r#"<app:Road xmlns:app="urn:app" fid="R1"><app:class>A</app:class>"#,
                r#"<app:lanes xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/>"#,
                r#"<app:geom><gml:Point xmlns:gml="http://www.opengis.net/gml" srsName="EPSG:4326">"#,
                r#"<gml:coordinates decimal="." cs="," ts=" ">1,2</gml:coordinates></gml:Point></app:geom></app:Road>"#
            )
        );
    }

    #[test]
    fn test_projection_and_bounded_by() {
        let feature = Feature::new(app("Road"))
            .with_property(Property::text(app("name"), "A1"))
            .with_property(Property::geometry(
                app("geom"),
                Geometry::Point(Point::new(vec![1.0, 2.0], Some(Crs::new("EPSG:4326")))),
            ));
        let xml = write(
            &writer(
                GmlVersion::Gml31,
                FeatureWriterOptions {
                    projection: Some(vec![app("geom")]),
                    generate_bounded_by: true,
                    ..FeatureWriterOptions::default()
                },
            ),
            &feature,
        );
        assert!(!xml.contains("app:name"));
        let bounds = xml.find("<gml:boundedBy").unwrap();
        assert!(xml[bounds..].starts_with(r#"<gml:boundedBy xmlns:gml="http://www.opengis.net/gml"><gml:Envelope"#), "{}", xml);
    }

    #[test]
    fn test_collection_member_stub() {
        let a = Rc::new(Feature::new(app("Road")).with_id("A"));
        let collection = FeatureCollection::new(QName::namespaced(GML_PRE_32_NS, "FeatureCollection"))
            .with_member(Rc::clone(&a))
            .with_member(a);
        let writer = writer(GmlVersion::Gml32, FeatureWriterOptions::default());
        let mut out = Vec::new();
        let mut emitter = XmlEmitter::new(&mut out, PrefixBindings::defaults_for(GmlVersion::Gml32));
        let mut ids = DocumentIdContext::new(GmlVersion::Gml32);
        writer.export_collection(&mut emitter, &mut ids, &collection).unwrap();
        emitter.finish().unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.starts_with(r#"<gml:FeatureCollection xmlns:gml="http://www.opengis.net/gml/3.2""#));
        assert!(xml.contains(r##"xlink:href="#A"/></gml:FeatureCollection>"##), "{}", xml);
        assert_eq!(xml.matches("gml:id=\"A\"").count(), 1);
    }

    #[derive(Debug)]
    struct CompanyRegistry;

    impl ReferenceResolver for CompanyRegistry {
        fn resolve(&self, uri: &str, _base: Option<&str>) -> Result<Option<GmlObject>> {
            Ok(uri.strip_prefix("http://example.com/companies.gml#").map(|id| {
                GmlObject::Feature(Rc::new(
                    Feature::new(app("Company"))
                        .with_id(id)
                        .with_property(Property::text(app("name"), "ACME")),
                ))
            }))
        }
    }

    fn remote_owner() -> Feature {
        let mut ids = DocumentIdContext::new(GmlVersion::Gml32);
        let reference = ids
            .create_reference("http://example.com/companies.gml#C9", crate::reference::ObjectCategory::Feature)
            .unwrap();
        Feature::new(app("Road"))
            .with_id("R1")
            .with_property(Property::new(app("owner"), PropertyValue::Reference(reference)))
    }

    #[test]
    fn test_remote_reference_traversed_within_depth() {
        let options = FeatureWriterOptions {
            xlink_depth: Some(1),
            resolver: Some(Rc::new(CompanyRegistry)),
            ..FeatureWriterOptions::default()
        };
        let xml = write(&writer(GmlVersion::Gml32, options), &remote_owner());
        assert!(xml.contains(r#"<app:Company gml:id="C9"><app:name>ACME</app:name></app:Company>"#), "{}", xml);
        assert!(!xml.contains("xlink:href"));
    }

    #[test]
    fn test_remote_reference_stub_without_resolver_or_depth() {
        let xml = write(&writer(GmlVersion::Gml32, FeatureWriterOptions::default()), &remote_owner());
        assert!(xml.contains(r#"xlink:href="http://example.com/companies.gml#C9"/>"#), "{}", xml);

        let options = FeatureWriterOptions {
            xlink_depth: Some(0),
            resolver: Some(Rc::new(CompanyRegistry)),
            ..FeatureWriterOptions::default()
        };
        let xml = write(&writer(GmlVersion::Gml32, options), &remote_owner());
        assert!(!xml.contains("<app:Company"), "{}", xml);
    }
}
