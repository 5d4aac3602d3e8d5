//! GML stream writer

use super::resolver::DocumentResolver;
use crate::config::{ReaderConfig, WriterConfig};
use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureCollection, FeatureMember, FeatureWriter, FeatureWriterOptions, Property};
use crate::geometry::{Envelope, Geometry, GeometryCodec, GeometryOptions, GeometryWriter};
use crate::namespaces::QName;
use crate::reference::{DocumentIdContext, GmlObject, ReferenceResolver};
use crate::version::GmlVersion;
use crate::xml::XmlEmitter;
use std::io::Write;
use std::rc::Rc;
use tracing::{debug, warn};

/// Writes GML objects to an output stream
pub struct GmlStreamWriter<'w> {
    emitter: XmlEmitter<'w>,
    config: WriterConfig,
    ids: DocumentIdContext,
    geometry: Rc<GeometryCodec>,
    features: FeatureWriter,
    started: bool,
}

impl<'w> GmlStreamWriter<'w> {
    /// Create a writer; all codecs are built from `config` here
    pub fn new<W: Write + 'w>(output: W, config: WriterConfig) -> Self {
        let version = config.version;
        let bindings = config.prefix_bindings();
        let emitter = match config.indent {
            Some(indent) => XmlEmitter::new_indented(output, bindings, indent),
            None => XmlEmitter::new(output, bindings),
        };
        let geometry = Rc::new(GeometryCodec::for_version(
            version,
            GeometryOptions {
                output_crs: config.output_crs.clone(),
                transformer: config.transformer.clone(),
                formatter: config.formatter,
                ..GeometryOptions::default()
            },
        ));
        let resolver: Option<Rc<dyn ReferenceResolver>> = match &config.resolver {
            Some(resolver) => Some(Rc::clone(resolver)),
            None if config.traverse_remote_references => Some(Rc::new(DocumentResolver::new(
                ReaderConfig::new(version).with_xlink_expiry(config.xlink_expiry()),
            ))),
            None => None,
        };
        let features = FeatureWriter::new(
            version,
            geometry.clone(),
            FeatureWriterOptions {
                xlink_depth: config.xlink_depth,
                remote_xlink_template: config.remote_xlink_template.clone(),
                projection: config.projection.clone(),
                export_extra_properties: config.export_extra_properties,
                generate_bounded_by: config.generate_bounded_by,
                formatter: config.formatter,
                resolver,
            },
        );
        Self {
            emitter,
            ids: DocumentIdContext::new(version),
            config,
            geometry,
            features,
            started: false,
        }
    }

    /// GML version written
    pub fn version(&self) -> GmlVersion {
        self.config.version
    }

    /// The session configuration
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Identity context tracking what was written
    pub fn id_context(&self) -> &DocumentIdContext {
        &self.ids
    }

    /// The underlying emitter, for wrapping objects in other elements
    pub fn emitter_mut(&mut self) -> &mut XmlEmitter<'w> {
        &mut self.emitter
    }

    fn begin(&mut self) -> Result<()> {
        if !self.started {
            self.started = true;
            if self.config.write_declaration {
                self.emitter.write_declaration()?;
            }
        }
        Ok(())
    }

    /// Write any object
    pub fn write(&mut self, object: &GmlObject) -> Result<()> {
        match object {
            GmlObject::Feature(feature) => self.write_feature(feature),
            GmlObject::FeatureCollection(collection) => self.write_feature_collection(collection),
            GmlObject::Geometry(geometry) => self.write_geometry(geometry),
            GmlObject::Definition(_) | GmlObject::Dictionary(_) => Err(Error::Unsupported(
                "Writing dictionaries is not supported".to_string(),
            )),
        }
    }

    /// Write a feature
    pub fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        self.begin()?;
        self.features.export_feature(&mut self.emitter, &mut self.ids, feature)
    }

    /// Write a geometry
    pub fn write_geometry(&mut self, geometry: &Geometry) -> Result<()> {
        self.begin()?;
        self.geometry.export(&mut self.emitter, &mut self.ids, geometry, None)
    }

    /// Write an envelope (`gml:Box` for GML 2)
    pub fn write_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        self.begin()?;
        self.geometry.export_envelope(&mut self.emitter, envelope)
    }

    /// Write a whole feature collection
    pub fn write_feature_collection(&mut self, collection: &FeatureCollection) -> Result<()> {
        self.begin()?;
        debug!(collection = %collection.name, members = collection.len(), "writing feature collection");
        self.features
            .export_collection(&mut self.emitter, &mut self.ids, collection)
    }

    /// Open a feature collection whose members are written one at a time
    pub fn start_feature_collection(
        &mut self,
        name: &QName,
        id: Option<&str>,
        bounded_by: Option<&Envelope>,
        properties: &[Property],
    ) -> Result<CollectionWriter<'_, 'w>> {
        self.begin()?;
        self.features
            .start_collection(&mut self.emitter, &mut self.ids, name, id, bounded_by, properties)?;
        Ok(CollectionWriter {
            depth: self.emitter.depth(),
            writer: self,
            members: 0,
            closed: false,
        })
    }

    /// Flush buffered output
    pub fn flush(&mut self) -> Result<()> {
        self.emitter.flush()
    }

    /// Check that every element was closed and flush the output
    pub fn finish(self) -> Result<()> {
        self.emitter.finish()
    }
}

impl std::fmt::Debug for GmlStreamWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmlStreamWriter")
            .field("config", &self.config)
            .field("depth", &self.emitter.depth())
            .finish()
    }
}

/// An open feature collection.
///
/// Dropping it without [`close`](CollectionWriter::close) still closes the
/// collection element but can only log write errors.
pub struct CollectionWriter<'s, 'w> {
    writer: &'s mut GmlStreamWriter<'w>,
    depth: usize,
    members: usize,
    closed: bool,
}

impl CollectionWriter<'_, '_> {
    /// Write one member feature
    pub fn write_member(&mut self, feature: &Rc<Feature>) -> Result<()> {
        self.write(&FeatureMember::Inline(Rc::clone(feature)))
    }

    /// Write one member, inline or as a reference
    pub fn write(&mut self, member: &FeatureMember) -> Result<()> {
        if self.writer.emitter.depth() != self.depth {
            return Err(Error::Xml(
                "Collection member written inside another element".to_string(),
            ));
        }
        let writer = &mut *self.writer;
        writer
            .features
            .export_member(&mut writer.emitter, &mut writer.ids, member)?;
        self.members += 1;
        Ok(())
    }

    /// Members written so far
    pub fn members_written(&self) -> usize {
        self.members
    }

    /// Close the collection element
    pub fn close(mut self) -> Result<()> {
        self.end()
    }

    fn end(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(members = self.members, "closing feature collection");
        self.writer.emitter.end_element()
    }
}

impl Drop for CollectionWriter<'_, '_> {
    fn drop(&mut self) {
        if let Err(err) = self.end() {
            warn!(error = %err, "failed to close feature collection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::geometry::Point;
    use crate::namespaces::GML_32_NS;
    use pretty_assertions::assert_eq;

    fn app(local: &str) -> QName {
        QName::namespaced("urn:app", local)
    }

    #[test]
    fn test_write_geometry_with_precision() {
        let mut out = Vec::new();
        {
            let config = WriterConfig::new(GmlVersion::Gml32)
                .with_formatter(crate::geometry::CoordinateFormatter::with_precision(2));
            let mut writer = GmlStreamWriter::new(&mut out, config);
            let point = Geometry::Point(Point::new(vec![1.23456, 2.0], Some(Crs::new("EPSG:4326"))));
            writer.write_geometry(&point).unwrap();
            writer.finish().unwrap();
        }
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.contains("<gml:pos>1.23 2</gml:pos>"), "{}", xml);
    }

    #[test]
    fn test_streamed_collection() {
        let mut out = Vec::new();
        {
            let config = WriterConfig::new(GmlVersion::Gml32)
                .with_namespace_binding("app", "urn:app")
                .with_declaration(true);
            let mut writer = GmlStreamWriter::new(&mut out, config);
            {
                let mut collection = writer
                    .start_feature_collection(
                        &QName::namespaced(GML_32_NS, "FeatureCollection"),
                        Some("FC"),
                        None,
                        &[],
                    )
                    .unwrap();
                for id in ["A", "B"] {
                    let feature = Rc::new(Feature::new(app("Road")).with_id(id));
                    collection.write_member(&feature).unwrap();
                }
                assert_eq!(collection.members_written(), 2);
                collection.close().unwrap();
            }
            writer.finish().unwrap();
        }
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert_eq!(xml.matches("<gml:featureMember>").count(), 2);
        assert!(xml.ends_with("</gml:FeatureCollection>"));
    }

    #[test]
    fn test_dropped_collection_is_closed() {
        let mut out = Vec::new();
        {
            let mut writer = GmlStreamWriter::new(&mut out, WriterConfig::default());
            writer
                .start_feature_collection(&QName::namespaced(GML_32_NS, "FeatureCollection"), None, None, &[])
                .unwrap();
            writer.finish().unwrap();
        }
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.contains("FeatureCollection"));
    }

    #[test]
    fn test_dictionary_write_unsupported() {
        let mut writer = GmlStreamWriter::new(Vec::new(), WriterConfig::default());
        let dictionary = crate::dictionary::Dictionary {
            id: "D".to_string(),
            definition: crate::dictionary::Definition {
                name: QName::namespaced(GML_32_NS, "Dictionary"),
                id: "D".to_string(),
                names: Vec::new(),
                description: None,
                identifier: None,
                code_space: None,
            },
            entries: Vec::new(),
        };
        let err = writer.write(&GmlObject::Dictionary(Rc::new(dictionary))).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
