//! Pull cursor over an XML token stream
//!
//! The cursor resolves element and attribute names against the in-scope
//! namespace declarations, drops comments and processing instructions,
//! trims whitespace-only text and reports empty elements as a start/end
//! pair. Readers follow one convention: a parse routine is entered with the
//! cursor on a start element and returns with the cursor on the matching
//! end element.

use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::namespaces::{NamespaceContext, NamespaceScopes, NamespaceUri, Prefix, QName};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;

/// Attribute with a resolved name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name; unprefixed attributes have no namespace
    pub name: QName,
    /// Unescaped value
    pub value: String,
}

/// Start tag with resolved names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartElement {
    /// Element name
    pub name: QName,
    /// Attributes, namespace declarations excluded
    pub attributes: Vec<Attribute>,
}

impl StartElement {
    /// Look up an attribute by namespace and local name
    pub fn attribute(&self, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local_name == local_name && a.name.namespace() == namespace)
            .map(|a| a.value.as_str())
    }
}

/// Cursor events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// Before the first token
    StartDocument,
    /// Start tag
    StartElement(StartElement),
    /// End tag
    EndElement(QName),
    /// Non-blank character data
    Characters(String),
    /// Input exhausted
    EndDocument,
}

/// Forward-only XML cursor
pub struct XmlCursor<'a> {
    reader: Reader<Box<dyn BufRead + 'a>>,
    buf: Vec<u8>,
    scopes: NamespaceScopes,
    current: XmlEvent,
    depth: usize,
    limits: Limits,
    system_id: Option<String>,
}

impl<'a> XmlCursor<'a> {
    /// Create a cursor positioned before the first token
    pub fn new<R: BufRead + 'a>(input: R) -> Self {
        let boxed: Box<dyn BufRead + 'a> = Box::new(input);
        let mut reader = Reader::from_reader(boxed);
        reader.trim_text(true);
        reader.expand_empty_elements(true);
        Self {
            reader,
            buf: Vec::new(),
            scopes: NamespaceScopes::new(),
            current: XmlEvent::StartDocument,
            depth: 0,
            limits: Limits::default(),
            system_id: None,
        }
    }

    /// Cursor over an in-memory string
    pub fn from_str(xml: &'a str) -> Self {
        Self::new(xml.as_bytes())
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the system id used for error locations and relative references
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    /// System id of the underlying document, if known
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    /// Current event
    pub fn event(&self) -> &XmlEvent {
        &self.current
    }

    /// Element nesting depth (1 while on the root start tag)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Byte offset in the input
    pub fn position(&self) -> usize {
        self.reader.buffer_position()
    }

    /// Limits in effect
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// True when on a start tag
    pub fn is_start(&self) -> bool {
        matches!(self.current, XmlEvent::StartElement(_))
    }

    /// True when on an end tag
    pub fn is_end(&self) -> bool {
        matches!(self.current, XmlEvent::EndElement(_))
    }

    /// Name of the current start or end tag
    pub fn name(&self) -> Option<&QName> {
        match &self.current {
            XmlEvent::StartElement(start) => Some(&start.name),
            XmlEvent::EndElement(name) => Some(name),
            _ => None,
        }
    }

    /// The current start tag
    pub fn start(&self) -> Option<&StartElement> {
        match &self.current {
            XmlEvent::StartElement(start) => Some(start),
            _ => None,
        }
    }

    /// Attribute without namespace on the current start tag
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.start().and_then(|s| s.attribute(None, local_name))
    }

    /// Namespaced attribute on the current start tag
    pub fn attribute_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.start()
            .and_then(|s| s.attribute(Some(namespace), local_name))
    }

    /// Snapshot of the in-scope namespace declarations
    pub fn namespace_context(&self) -> NamespaceContext {
        self.scopes.context()
    }

    /// Build a parse error carrying the current location and element
    pub fn parse_error(&self, message: impl Into<String>) -> Error {
        let location = match &self.system_id {
            Some(id) => format!("{}, byte {}", id, self.position()),
            None => format!("byte {}", self.position()),
        };
        let mut err = ParseError::new(message).with_location(location);
        if let Some(name) = self.name() {
            err = err.with_element(name.to_string());
        }
        Error::Parse(err)
    }

    /// Attach the current location to a parse error that lacks one
    pub fn locate(&self, err: Error) -> Error {
        match err {
            Error::Parse(pe) if pe.location.is_none() => {
                let located = self.parse_error(pe.message);
                match (located, pe.element) {
                    (Error::Parse(mut loc), Some(element)) => {
                        loc.element = Some(element);
                        Error::Parse(loc)
                    }
                    (located, _) => located,
                }
            }
            other => other,
        }
    }

    /// Advance to the next event
    pub fn next(&mut self) -> Result<&XmlEvent> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        self.reader.buffer_position(),
                        e
                    )))
                }
            };

            match event {
                Event::Start(start) => {
                    let element = open_element(&start, &mut self.scopes)?;
                    self.depth += 1;
                    self.limits.check_xml_depth(self.depth)?;
                    self.current = XmlEvent::StartElement(element);
                }
                Event::End(end) => {
                    let raw = std::str::from_utf8(end.name().as_ref())
                        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
                        .to_string();
                    let name = resolve_name(&raw, &self.scopes, true)?;
                    self.scopes.pop();
                    self.depth = self.depth.saturating_sub(1);
                    self.current = XmlEvent::EndElement(name);
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                    if text.trim().is_empty() {
                        continue;
                    }
                    self.current = XmlEvent::Characters(text.into_owned());
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    if text.trim().is_empty() {
                        continue;
                    }
                    self.current = XmlEvent::Characters(text);
                }
                Event::Eof => self.current = XmlEvent::EndDocument,
                _ => continue,
            }
            break;
        }
        if self.current == XmlEvent::EndDocument && self.depth > 0 {
            return Err(self.parse_error("Unexpected end of document"));
        }
        Ok(&self.current)
    }

    /// Advance to the next start or end tag, rejecting text in between
    pub fn next_tag(&mut self) -> Result<()> {
        loop {
            match self.next()? {
                XmlEvent::StartElement(_) | XmlEvent::EndElement(_) => return Ok(()),
                XmlEvent::Characters(text) => {
                    let text = text.clone();
                    return Err(self.parse_error(format!(
                        "Unexpected text '{}' where an element was expected",
                        text
                    )));
                }
                XmlEvent::EndDocument => {
                    return Err(self.parse_error("Unexpected end of document"));
                }
                XmlEvent::StartDocument => continue,
            }
        }
    }

    /// Fail unless the cursor is on a start tag
    pub fn require_start(&self) -> Result<&QName> {
        match &self.current {
            XmlEvent::StartElement(start) => Ok(&start.name),
            other => Err(self.parse_error(format!(
                "Expected a start element, found {}",
                describe(other)
            ))),
        }
    }

    /// Fail unless the cursor is on the given end tag
    pub fn require_end(&self, name: &QName) -> Result<()> {
        match &self.current {
            XmlEvent::EndElement(end) if end == name => Ok(()),
            other => Err(self.parse_error(format!(
                "Expected end of element '{}', found {}",
                name,
                describe(other)
            ))),
        }
    }

    /// Read the text content of the current element.
    ///
    /// Leaves the cursor on the element's end tag. Child elements are a
    /// parse error.
    pub fn element_text(&mut self) -> Result<String> {
        let name = self.require_start()?.clone();
        let mut text = String::new();
        loop {
            match self.next()? {
                XmlEvent::Characters(chunk) => text.push_str(chunk),
                XmlEvent::EndElement(_) => break,
                XmlEvent::StartElement(child) => {
                    let child = child.name.to_string();
                    return Err(self.parse_error(format!(
                        "Unexpected element '{}' in text content of '{}'",
                        child, name
                    )));
                }
                XmlEvent::EndDocument | XmlEvent::StartDocument => {
                    return Err(self.parse_error("Unexpected end of document"));
                }
            }
        }
        Ok(text.trim().to_string())
    }

    /// Skip the current element and everything inside it.
    ///
    /// Leaves the cursor on the element's end tag.
    pub fn skip_element(&mut self) -> Result<()> {
        self.require_start()?;
        let target = self.depth - 1;
        loop {
            let at_end = matches!(self.next()?, XmlEvent::EndElement(_));
            if at_end && self.depth == target {
                return Ok(());
            }
            if self.current == XmlEvent::EndDocument {
                return Err(self.parse_error("Unexpected end of document"));
            }
        }
    }
}

impl std::fmt::Debug for XmlCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlCursor")
            .field("current", &self.current)
            .field("depth", &self.depth)
            .field("system_id", &self.system_id)
            .finish()
    }
}

fn describe(event: &XmlEvent) -> String {
    match event {
        XmlEvent::StartDocument => "start of document".to_string(),
        XmlEvent::StartElement(start) => format!("start of '{}'", start.name),
        XmlEvent::EndElement(name) => format!("end of '{}'", name),
        XmlEvent::Characters(_) => "text".to_string(),
        XmlEvent::EndDocument => "end of document".to_string(),
    }
}

fn open_element(start: &BytesStart<'_>, scopes: &mut NamespaceScopes) -> Result<StartElement> {
    let mut declarations: Vec<(Option<Prefix>, NamespaceUri)> = Vec::new();
    let mut raw_attributes: Vec<(String, String)> = Vec::new();

    for attr_result in start.attributes() {
        let attr =
            attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
            .to_string();
        let value: Cow<'_, str> = attr
            .unescape_value()
            .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?;

        if key == "xmlns" {
            declarations.push((None, value.into_owned()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push((Some(prefix.to_string()), value.into_owned()));
        } else {
            raw_attributes.push((key, value.into_owned()));
        }
    }

    scopes.push(declarations);

    let raw_name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
        .to_string();
    let name = resolve_name(&raw_name, scopes, true)?;
    let attributes = raw_attributes
        .into_iter()
        .map(|(key, value)| {
            Ok(Attribute {
                name: resolve_name(&key, scopes, false)?,
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StartElement { name, attributes })
}

fn resolve_name(raw: &str, scopes: &NamespaceScopes, use_default: bool) -> Result<QName> {
    match raw.split_once(':') {
        Some((prefix, local)) => {
            let namespace = scopes
                .resolve_prefix(Some(prefix))
                .ok_or_else(|| Error::Namespace(format!("Unbound prefix '{}' in '{}'", prefix, raw)))?;
            Ok(QName::namespaced(namespace, local))
        }
        None if use_default => Ok(QName::new(scopes.resolve_prefix(None), raw)),
        None => Ok(QName::local(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::{GML_32_NS, XLINK_NS};

    const DOC: &str = r##"<?xml version="1.0"?>
<!-- leading comment -->
<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" gml:id="P1" srsName="EPSG:4326">
  <gml:pos>10 20</gml:pos>
  <gml:name xmlns:xlink="http://www.w3.org/1999/xlink" xlink:href="#x"/>
</gml:Point>"##;

    #[test]
    fn test_resolves_names_and_attributes() {
        let mut cursor = XmlCursor::from_str(DOC);
        cursor.next_tag().unwrap();
        let name = cursor.require_start().unwrap().clone();
        assert!(name.is(GML_32_NS, "Point"));
        assert_eq!(cursor.attribute("srsName"), Some("EPSG:4326"));
        assert_eq!(cursor.attribute_ns(GML_32_NS, "id"), Some("P1"));
        assert_eq!(cursor.depth(), 1);

        cursor.next_tag().unwrap();
        assert_eq!(cursor.element_text().unwrap(), "10 20");
        assert!(cursor.is_end());

        cursor.next_tag().unwrap();
        assert_eq!(cursor.attribute_ns(XLINK_NS, "href"), Some("#x"));
        cursor.next_tag().unwrap();
        assert!(cursor.is_end());
        cursor.next_tag().unwrap();
        cursor.require_end(&name).unwrap();
        assert!(matches!(cursor.next().unwrap(), XmlEvent::EndDocument));
    }

    #[test]
    fn test_skip_element() {
        let mut cursor = XmlCursor::from_str("<a><b><c>text</c><c/></b><d/></a>");
        cursor.next_tag().unwrap();
        cursor.next_tag().unwrap();
        assert_eq!(cursor.name().unwrap().local_name, "b");
        cursor.skip_element().unwrap();
        assert_eq!(cursor.name().unwrap().local_name, "b");
        assert!(cursor.is_end());
        cursor.next_tag().unwrap();
        assert_eq!(cursor.name().unwrap().local_name, "d");
    }

    #[test]
    fn test_text_where_element_expected() {
        let mut cursor = XmlCursor::from_str("<a>stray<b/></a>");
        cursor.next_tag().unwrap();
        let err = cursor.next_tag().unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("stray"));
    }

    #[test]
    fn test_element_in_text_content() {
        let mut cursor = XmlCursor::from_str("<a>1 2<b/></a>");
        cursor.next_tag().unwrap();
        assert!(cursor.element_text().unwrap_err().is_parse());
    }

    #[test]
    fn test_depth_limit() {
        let limits = Limits {
            max_xml_depth: 2,
            ..Limits::default()
        };
        let mut cursor = XmlCursor::from_str("<a><b><c/></b></a>").with_limits(limits);
        cursor.next_tag().unwrap();
        cursor.next_tag().unwrap();
        assert!(matches!(cursor.next_tag(), Err(Error::LimitExceeded(_))));
    }

    #[test]
    fn test_unbound_prefix() {
        let mut cursor = XmlCursor::from_str("<x:a/>");
        assert!(matches!(cursor.next_tag(), Err(Error::Namespace(_))));
    }

    #[test]
    fn test_parse_error_location() {
        let mut cursor = XmlCursor::from_str("<a/>").with_system_id("doc.gml");
        cursor.next_tag().unwrap();
        let text = cursor.parse_error("boom").to_string();
        assert!(text.contains("doc.gml"));
        assert!(text.contains("element: a"));
    }
}
