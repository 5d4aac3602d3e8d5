//! Dereferencing of `xlink:href` values that point into other documents

use super::reader::GmlStreamReader;
use crate::config::ReaderConfig;
use crate::error::Result;
use crate::loaders::Loader;
use crate::locations::{Href, Location};
use crate::reference::{DocumentIdContext, GmlObject, ReferenceResolver};
use crate::xml::XmlCursor;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug)]
struct LoadedDocument {
    root: GmlObject,
    ids: DocumentIdContext,
}

/// Resolves remote references by loading and parsing the target document.
///
/// Each document is read once with a nested [`GmlStreamReader`] and kept for
/// later references into it. Nested documents do not dereference further
/// remote references.
#[derive(Debug)]
pub struct DocumentResolver {
    config: ReaderConfig,
    loader: Loader,
    documents: RefCell<HashMap<String, Rc<LoadedDocument>>>,
}

impl DocumentResolver {
    /// Create a resolver reading documents with `config`
    pub fn new(mut config: ReaderConfig) -> Self {
        let loader = Loader::new()
            .with_limits(config.limits.clone())
            .with_expiry(config.xlink_expiry());
        config.reference_patterns.clear();
        config.resolver = None;
        Self {
            config,
            loader,
            documents: RefCell::new(HashMap::new()),
        }
    }

    /// Use another loader
    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    /// Number of documents loaded so far
    pub fn document_count(&self) -> usize {
        self.documents.borrow().len()
    }

    fn document(&self, location: &Location) -> Result<Rc<LoadedDocument>> {
        let key = location.as_str();
        if let Some(document) = self.documents.borrow().get(&key) {
            return Ok(Rc::clone(document));
        }

        debug!(location = %key, "loading referenced document");
        let text = self.loader.load(location)?;
        let cursor = XmlCursor::from_str(&text)
            .with_limits(self.config.limits.clone())
            .with_system_id(key.clone());
        let mut reader = GmlStreamReader::new(cursor, self.config.clone())?;
        let root = reader.read()?;
        reader.resolve_references();
        let document = Rc::new(LoadedDocument {
            root,
            ids: reader.into_id_context(),
        });
        self.documents.borrow_mut().insert(key, Rc::clone(&document));
        Ok(document)
    }
}

impl ReferenceResolver for DocumentResolver {
    fn resolve(&self, uri: &str, base: Option<&str>) -> Result<Option<GmlObject>> {
        let href = Href::parse(uri)?;
        let Some(location) = href.document_location(base) else {
            return Ok(None);
        };
        let document = self.document(&location?)?;
        Ok(match href.id() {
            Some(id) => document.ids.get_object(id).cloned(),
            None => Some(document.root.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TARGET: &str = r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" gml:id="P1" srsName="EPSG:4326"><gml:pos>5 6</gml:pos></gml:Point>"#;

    #[test]
    fn test_resolve_fragment_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target.gml"), TARGET).unwrap();
        let base = dir.path().join("source.gml");

        let resolver = DocumentResolver::new(ReaderConfig::default());
        let object = resolver
            .resolve("target.gml#P1", Some(&base.to_string_lossy()))
            .unwrap()
            .unwrap();
        assert_eq!(object.id(), Some("P1"));

        assert!(resolver
            .resolve("target.gml#nope", Some(&base.to_string_lossy()))
            .unwrap()
            .is_none());
        assert_eq!(resolver.document_count(), 1);
    }

    #[test]
    fn test_missing_document() {
        let resolver = DocumentResolver::new(ReaderConfig::default());
        let err = resolver.resolve("/nonexistent/doc.gml#A", None).unwrap_err();
        assert!(matches!(err, crate::error::Error::Resource(_)));
    }

    #[test]
    fn test_local_href_is_not_resolved_here() {
        let resolver = DocumentResolver::new(ReaderConfig::default());
        assert!(resolver.resolve("#A", None).unwrap().is_none());
    }
}
