//! In-memory element trees
//!
//! Small documents such as application schemas are easier to walk as a
//! tree than as a token stream. Trees are built on top of [`XmlCursor`], so
//! names are already namespace-resolved, and every element keeps a snapshot
//! of its in-scope prefixes for resolving QName-valued attributes.

use crate::error::{Error, Result};
use crate::namespaces::{NamespaceContext, QName};
use crate::xml::{Attribute, XmlCursor, XmlEvent};

/// XML Element in the document tree
#[derive(Debug, Clone)]
pub struct Element {
    /// Element qualified name
    pub name: QName,
    /// Element attributes
    pub attributes: Vec<Attribute>,
    /// Text content (if any)
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
    /// Namespace context for this element
    pub namespaces: NamespaceContext,
}

impl Element {
    /// Create a new element
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            namespaces: NamespaceContext::new(),
        }
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    /// Whether the element has the given namespace and local name
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.name.is(namespace, local_name)
    }

    /// Unqualified attribute value
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attribute_ns(None, local_name)
    }

    /// Attribute value by namespace and local name
    pub fn attribute_ns(&self, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local_name == local_name && a.name.namespace() == namespace)
            .map(|a| a.value.as_str())
    }

    /// Resolve a QName-valued attribute (`type`, `base`, `ref`, ...)
    pub fn qname_attribute(&self, local_name: &str) -> Result<Option<QName>> {
        match self.attribute(local_name) {
            Some(value) => self.namespaces.resolve(value.trim()).map(Some),
            None => Ok(None),
        }
    }

    /// Child elements with the given namespace and local name
    pub fn children_named<'e>(&'e self, namespace: &'e str, local_name: &'e str) -> impl Iterator<Item = &'e Element> + 'e {
        self.children.iter().filter(move |e| e.is(namespace, local_name))
    }

    /// First child with the given name
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|e| e.is(namespace, local_name))
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    fn read(cursor: &mut XmlCursor<'_>) -> Result<Self> {
        let start = cursor
            .start()
            .cloned()
            .ok_or_else(|| cursor.parse_error("Expected a start element"))?;
        let mut element = Element {
            name: start.name,
            attributes: start.attributes,
            text: None,
            children: Vec::new(),
            namespaces: cursor.namespace_context(),
        };
        loop {
            match cursor.next()? {
                XmlEvent::StartElement(_) => {
                    let child = Element::read(cursor)?;
                    element.add_child(child);
                }
                XmlEvent::Characters(text) => {
                    let text = text.clone();
                    match element.text.as_mut() {
                        Some(existing) => existing.push_str(&text),
                        None => element.text = Some(text),
                    }
                }
                XmlEvent::EndElement(_) => return Ok(element),
                XmlEvent::StartDocument | XmlEvent::EndDocument => {
                    return Err(cursor.parse_error("Unexpected end of document"))
                }
            }
        }
    }
}

/// XML Document representation
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element of the document
    pub root: Element,
    /// Where the document came from
    pub system_id: Option<String>,
}

impl Document {
    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        let mut cursor = XmlCursor::from_str(xml);
        Self::from_cursor(&mut cursor)
    }

    /// Read the next element of the cursor as a whole document
    pub fn from_cursor(cursor: &mut XmlCursor<'_>) -> Result<Self> {
        if !cursor.is_start() {
            cursor.next_tag()?;
        }
        if !cursor.is_start() {
            return Err(Error::Xml("Document has no root element".to_string()));
        }
        let root = Element::read(cursor)?;
        Ok(Self {
            root,
            system_id: cursor.system_id().map(str::to_string),
        })
    }

    /// Get the root element
    pub fn root(&self) -> &Element {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<root><child>text</child></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root();
        assert_eq!(root.local_name(), "root");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].local_name(), "child");
        assert_eq!(root.children[0].text.as_deref(), Some("text"));
    }

    #[test]
    fn test_parse_with_attributes() {
        let xml = r#"<root attr1="value1" attr2="value2"><child/></root>"#;
        let doc = Document::from_string(xml).unwrap();

        assert_eq!(doc.root.attribute("attr1"), Some("value1"));
        assert_eq!(doc.root.attribute("attr2"), Some("value2"));
        assert_eq!(doc.root.children.len(), 1);
    }

    #[test]
    fn test_qname_attribute() {
        let xml = r#"<xs:element xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:gml="http://www.opengis.net/gml/3.2">
            <xs:complexType><xs:attribute type="gml:PointPropertyType"/></xs:complexType>
        </xs:element>"#;
        let doc = Document::from_string(xml).unwrap();
        let attribute = &doc.root.children[0].children[0];
        assert_eq!(
            attribute.qname_attribute("type").unwrap(),
            Some(QName::namespaced("http://www.opengis.net/gml/3.2", "PointPropertyType"))
        );
        assert!(attribute.qname_attribute("missing").unwrap().is_none());
    }

    #[test]
    fn test_children_named() {
        let xml = r#"<root xmlns="urn:a"><child1/><child2/><child1/></root>"#;
        let doc = Document::from_string(xml).unwrap();
        assert_eq!(doc.root.children_named("urn:a", "child1").count(), 2);
        assert!(doc.root.child("urn:a", "child3").is_none());
    }
}
