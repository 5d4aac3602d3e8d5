//! GML stream reader
//!
//! Every read call expects the cursor on the start tag of the object to read
//! and leaves it on the event after the object's end tag, so objects that
//! follow each other in a document can be read one after the other.

use super::resolver::DocumentResolver;
use crate::config::ReaderConfig;
use crate::crs::Crs;
use crate::dictionary::{is_dictionary_element, Dictionary, DictionaryReader};
use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureCollection, FeatureReader, FeatureStream};
use crate::geometry::{Geometry, GeometryCodec, GeometryOptions, GeometryReader};
use crate::reference::{DocumentIdContext, GmlObject, ReferenceResolver};
use crate::version::GmlVersion;
use crate::xml::{XmlCursor, XmlEvent};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};

/// Reads GML objects from an XML cursor
pub struct GmlStreamReader<'a> {
    cursor: XmlCursor<'a>,
    config: ReaderConfig,
    ids: DocumentIdContext,
    geometry: Rc<GeometryCodec>,
    features: FeatureReader,
    dictionaries: DictionaryReader,
}

impl<'a> GmlStreamReader<'a> {
    /// Create a reader over `cursor`.
    ///
    /// A cursor that has not been advanced yet is moved to the root element.
    pub fn new(mut cursor: XmlCursor<'a>, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        if matches!(cursor.event(), XmlEvent::StartDocument) {
            cursor.next_tag()?;
        }

        let version = config.version;
        let geometry = Rc::new(GeometryCodec::for_version(
            version,
            GeometryOptions {
                lax: config.lax,
                default_dimension: config.default_dimension,
                limits: config.limits.clone(),
                crs_registry: config.crs_registry.clone(),
                ..GeometryOptions::default()
            },
        ));
        let features = FeatureReader::new(version, geometry.clone())
            .with_schema(config.schema.clone())
            .with_lax(config.lax);
        let dictionaries = DictionaryReader::new(version, config.lax);

        let mut ids = DocumentIdContext::new(version)
            .with_strict_ids(config.strict_ids)
            .with_limits(config.limits.clone())
            .with_system_id(cursor.system_id().map(str::to_string));
        if let Some(matcher) = config.reference_matcher()? {
            ids.set_reference_pattern_matcher(matcher);
            let resolver: Rc<dyn ReferenceResolver> = match &config.resolver {
                Some(resolver) => Rc::clone(resolver),
                None => Rc::new(DocumentResolver::new(config.clone())),
            };
            ids.set_resolver(resolver);
        }

        debug!(%version, system_id = ?cursor.system_id(), "opened GML stream reader");
        Ok(Self {
            cursor,
            config,
            ids,
            geometry,
            features,
            dictionaries,
        })
    }

    /// Reader over an in-memory document
    pub fn from_str(xml: &'a str, config: ReaderConfig) -> Result<Self> {
        let cursor = XmlCursor::from_str(xml).with_limits(config.limits.clone());
        Self::new(cursor, config)
    }

    /// Reader over any buffered input
    pub fn from_reader<R: BufRead + 'a>(input: R, config: ReaderConfig) -> Result<Self> {
        let cursor = XmlCursor::new(input).with_limits(config.limits.clone());
        Self::new(cursor, config)
    }

    /// Reader over a file; its path becomes the base of relative references
    pub fn from_file(path: impl AsRef<Path>, config: ReaderConfig) -> Result<GmlStreamReader<'static>> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let cursor = XmlCursor::new(BufReader::new(file))
            .with_limits(config.limits.clone())
            .with_system_id(path.to_string_lossy());
        GmlStreamReader::new(cursor, config)
    }

    /// GML version read
    pub fn version(&self) -> GmlVersion {
        self.config.version
    }

    /// The session configuration
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// The underlying cursor
    pub fn cursor(&self) -> &XmlCursor<'a> {
        &self.cursor
    }

    /// The underlying cursor, for moving between objects
    pub fn cursor_mut(&mut self) -> &mut XmlCursor<'a> {
        &mut self.cursor
    }

    /// Identity context of this session
    pub fn id_context(&self) -> &DocumentIdContext {
        &self.ids
    }

    /// Mutable identity context of this session
    pub fn id_context_mut(&mut self) -> &mut DocumentIdContext {
        &mut self.ids
    }

    /// Give up the reader and keep its identity context
    pub fn into_id_context(self) -> DocumentIdContext {
        self.ids
    }

    fn default_crs(&self) -> Option<Crs> {
        self.config.default_crs.clone()
    }

    // move past the end tag the codec stopped on
    fn finish_object(&mut self) -> Result<()> {
        self.cursor.next()?;
        Ok(())
    }

    /// Read the object at the cursor, whatever it is.
    ///
    /// Elements declared as feature types in the application schema win over
    /// geometry elements of the same name.
    pub fn read(&mut self) -> Result<GmlObject> {
        let name = self.cursor.require_start()?.clone();

        if self.features.is_collection_element(&name) {
            return self.read_feature_collection().map(GmlObject::FeatureCollection);
        }
        if self.features.is_feature_element(&name) {
            return self.read_feature().map(GmlObject::Feature);
        }
        if self.geometry.is_geometry_element(&name) {
            return self.read_geometry().map(GmlObject::Geometry);
        }
        if is_dictionary_element(self.version(), &name) {
            return self.read_dictionary().map(GmlObject::Dictionary);
        }
        if self.features.schema().is_some() && !self.config.lax {
            return Err(self.cursor.parse_error(format!(
                "Element '{}' is neither a feature nor a geometry.",
                name
            )));
        }
        self.read_feature().map(GmlObject::Feature)
    }

    /// Read the feature at the cursor
    pub fn read_feature(&mut self) -> Result<Rc<Feature>> {
        let crs = self.default_crs();
        let feature = self.features.parse_feature(&mut self.cursor, &mut self.ids, crs.as_ref())?;
        self.finish_object()?;
        Ok(feature)
    }

    /// Read the geometry at the cursor and register it under its id
    pub fn read_geometry(&mut self) -> Result<Rc<Geometry>> {
        let crs = self.default_crs();
        let geometry = Rc::new(self.geometry.parse(&mut self.cursor, &mut self.ids, crs.as_ref())?);
        self.ids
            .register_object(GmlObject::Geometry(Rc::clone(&geometry)))
            .map_err(|e| self.cursor.locate(e))?;
        self.finish_object()?;
        Ok(geometry)
    }

    /// Read the whole feature collection at the cursor
    pub fn read_feature_collection(&mut self) -> Result<Rc<FeatureCollection>> {
        let crs = self.default_crs();
        let collection = self
            .features
            .parse_feature_collection(&mut self.cursor, &mut self.ids, crs.as_ref())?;
        self.finish_object()?;
        Ok(collection)
    }

    /// Stream the members of the feature collection at the cursor.
    ///
    /// The stream moves the cursor past the collection once it is exhausted,
    /// closed or dropped.
    pub fn read_feature_collection_stream(&mut self) -> Result<FeatureStream<'_, 'a>> {
        let crs = self.config.default_crs.clone();
        let name = self.cursor.require_start()?.clone();
        if !self.features.is_collection_element(&name) {
            warn!(element = %name, "streaming an element not known as a feature collection");
        }
        FeatureStream::new(
            &self.features,
            &mut self.cursor,
            &mut self.ids,
            crs.as_ref(),
            self.config.retain_stream_members,
        )
    }

    /// Read the dictionary at the cursor and register it
    pub fn read_dictionary(&mut self) -> Result<Rc<Dictionary>> {
        let dictionary = Rc::new(self.dictionaries.read_dictionary(&mut self.cursor, &mut self.ids)?);
        self.ids
            .register_object(GmlObject::Dictionary(Rc::clone(&dictionary)))
            .map_err(|e| self.cursor.locate(e))?;
        self.finish_object()?;
        Ok(dictionary)
    }

    /// CRS definitions cannot be read
    pub fn read_crs(&mut self) -> Result<Crs> {
        Err(Error::Unsupported(
            "Reading CRS definitions from GML is not supported".to_string(),
        ))
    }

    /// Bind the references collected so far; returns the dangling hrefs
    pub fn resolve_references(&mut self) -> Vec<String> {
        self.ids.resolve_references()
    }

    /// Resolve what is left and end the session.
    ///
    /// Returns the hrefs that stayed unresolved.
    pub fn close(mut self) -> Vec<String> {
        let dangling = self.ids.resolve_references();
        if !dangling.is_empty() {
            warn!(count = dangling.len(), "closing GML stream with dangling references");
        }
        dangling
    }
}

impl std::fmt::Debug for GmlStreamReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmlStreamReader")
            .field("config", &self.config)
            .field("objects", &self.ids.object_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::QName;
    use crate::schema::{ApplicationSchema, FeatureType};

    const POINT_32: &str = r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" gml:id="P1" srsName="EPSG:4326"><gml:pos>1 2</gml:pos></gml:Point>"#;

    #[test]
    fn test_read_dispatches_geometry() {
        let mut reader = GmlStreamReader::from_str(POINT_32, ReaderConfig::default()).unwrap();
        let object = reader.read().unwrap();
        assert!(matches!(object, GmlObject::Geometry(_)));
        assert!(reader.id_context().get_object("P1").is_some());
        assert_eq!(reader.cursor().event(), &XmlEvent::EndDocument);
    }

    #[test]
    fn test_schema_feature_wins_over_geometry() {
        let name = QName::namespaced(crate::namespaces::GML_32_NS, "Point");
        let schema = ApplicationSchema::new().with_feature_type(FeatureType::new(name));
        let config = ReaderConfig::default().with_schema(schema);
        let xml = r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" gml:id="F1"/>"#;
        let mut reader = GmlStreamReader::from_str(xml, config).unwrap();
        match reader.read().unwrap() {
            GmlObject::Feature(feature) => assert_eq!(feature.id.as_deref(), Some("F1")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sequential_reads() {
        let xml = r#"<wrapper xmlns:gml="http://www.opengis.net/gml/3.2">
            <gml:Point gml:id="A" srsName="EPSG:4326"><gml:pos>1 2</gml:pos></gml:Point>
            <gml:Point gml:id="B" srsName="EPSG:4326"><gml:pos>3 4</gml:pos></gml:Point>
        </wrapper>"#;
        let mut reader = GmlStreamReader::from_str(xml, ReaderConfig::default()).unwrap();
        reader.cursor_mut().next_tag().unwrap();
        let a = reader.read_geometry().unwrap();
        assert!(reader.cursor().is_start());
        let b = reader.read_geometry().unwrap();
        assert_eq!(a.id(), Some("A"));
        assert_eq!(b.id(), Some("B"));
        assert!(reader.cursor().is_end());
    }

    #[test]
    fn test_read_crs_unsupported() {
        let mut reader = GmlStreamReader::from_str(POINT_32, ReaderConfig::default()).unwrap();
        assert!(matches!(reader.read_crs(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_precondition_violation() {
        let mut reader = GmlStreamReader::from_str(POINT_32, ReaderConfig::default()).unwrap();
        reader.read().unwrap();
        assert!(reader.read().unwrap_err().is_parse());
    }

    #[test]
    fn test_close_reports_dangling() {
        let xml = r##"<app:Road xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:xlink="http://www.w3.org/1999/xlink" gml:id="R1">
            <app:owner xlink:href="#missing"/>
        </app:Road>"##;
        let mut reader = GmlStreamReader::from_str(xml, ReaderConfig::default()).unwrap();
        reader.read_feature().unwrap();
        assert_eq!(reader.close(), vec!["#missing".to_string()]);
    }
}
