//! Namespace-aware XML writer
//!
//! Start tags are held back until the first child, text or end tag, so
//! attributes may be added after [`XmlEmitter::start_element`]. Prefixes come
//! from [`PrefixBindings`]; a namespace without a binding gets a generated
//! `nsN` prefix. Declarations are written on the first element that needs
//! them.

use crate::error::{Error, Result};
use crate::namespaces::{PrefixBindings, XML_NS};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

/// Streaming XML writer with automatic namespace declarations
pub struct XmlEmitter<'a> {
    writer: Writer<Box<dyn Write + 'a>>,
    bindings: PrefixBindings,
    // prefix declarations per open element
    declared: Vec<Vec<(String, String)>>,
    pending: Option<BytesStart<'static>>,
    open: Vec<String>,
    generated: usize,
}

impl<'a> XmlEmitter<'a> {
    /// Create an emitter without indentation
    pub fn new<W: Write + 'a>(output: W, bindings: PrefixBindings) -> Self {
        let boxed: Box<dyn Write + 'a> = Box::new(output);
        Self::with_writer(Writer::new(boxed), bindings)
    }

    /// Create an emitter indenting nested elements by `indent` spaces
    pub fn new_indented<W: Write + 'a>(output: W, bindings: PrefixBindings, indent: usize) -> Self {
        let boxed: Box<dyn Write + 'a> = Box::new(output);
        Self::with_writer(Writer::new_with_indent(boxed, b' ', indent), bindings)
    }

    fn with_writer(writer: Writer<Box<dyn Write + 'a>>, bindings: PrefixBindings) -> Self {
        Self {
            writer,
            bindings,
            declared: Vec::new(),
            pending: None,
            open: Vec::new(),
            generated: 0,
        }
    }

    /// Prefix bindings in use
    pub fn bindings(&self) -> &PrefixBindings {
        &self.bindings
    }

    /// Number of currently open elements
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Write the XML declaration
    pub fn write_declaration(&mut self) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    /// Bind a prefix, declaring it on the pending start tag if there is one
    pub fn declare_namespace(&mut self, prefix: &str, namespace: &str) -> Result<()> {
        self.bindings.bind(prefix, namespace);
        if self.pending.is_some() {
            self.declare_on_pending(prefix, namespace)?;
        }
        Ok(())
    }

    /// Open an element
    pub fn start_element(&mut self, namespace: Option<&str>, local_name: &str) -> Result<()> {
        self.flush_pending()?;
        self.declared.push(Vec::new());
        let (name, declaration) = self.qualify(namespace, local_name);
        self.pending = Some(BytesStart::new(name.clone()));
        self.open.push(name);
        if let Some((prefix, ns)) = declaration {
            self.declare_on_pending(&prefix, &ns)?;
        }
        Ok(())
    }

    /// Add an attribute to the pending start tag
    pub fn attribute(&mut self, namespace: Option<&str>, local_name: &str, value: &str) -> Result<()> {
        if self.pending.is_none() {
            return Err(Error::Xml(format!(
                "Attribute '{}' written outside of a start tag",
                local_name
            )));
        }
        let (name, declaration) = self.qualify(namespace, local_name);
        if let Some((prefix, ns)) = declaration {
            self.declare_on_pending(&prefix, &ns)?;
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.push_attribute((name.as_str(), value));
        }
        Ok(())
    }

    /// Write escaped character data
    pub fn characters(&mut self, text: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    /// Write a comment
    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer
            .write_event(Event::Comment(BytesText::from_escaped(text)))?;
        Ok(())
    }

    /// Close the innermost open element
    pub fn end_element(&mut self) -> Result<()> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| Error::Xml("No open element to close".to_string()))?;
        self.declared.pop();
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => self.writer.write_event(Event::End(BytesEnd::new(name)))?,
        }
        Ok(())
    }

    /// Write `<name>text</name>`
    pub fn text_element(&mut self, namespace: Option<&str>, local_name: &str, text: &str) -> Result<()> {
        self.start_element(namespace, local_name)?;
        self.characters(text)?;
        self.end_element()
    }

    /// Check that every element was closed and flush the output
    pub fn finish(mut self) -> Result<()> {
        if !self.open.is_empty() {
            return Err(Error::Xml(format!(
                "{} element(s) still open: {}",
                self.open.len(),
                self.open.join(", ")
            )));
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }

    /// Flush buffered output without closing anything
    pub fn flush(&mut self) -> Result<()> {
        self.flush_pending()?;
        self.writer.get_mut().flush()?;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    fn prefix_in_scope(&self, namespace: &str) -> Option<String> {
        if namespace == XML_NS {
            return Some("xml".to_string());
        }
        for frame in self.declared.iter().rev() {
            if let Some((prefix, _)) = frame.iter().find(|(_, ns)| ns == namespace) {
                // shadowed by a later declaration of the same prefix?
                let shadowed = self
                    .declared
                    .iter()
                    .rev()
                    .take_while(|f| !std::ptr::eq(*f, frame))
                    .any(|f| f.iter().any(|(p, ns)| p == prefix && ns != namespace));
                if !shadowed {
                    return Some(prefix.clone());
                }
            }
        }
        None
    }

    // qualified name plus the declaration it still needs, if any
    fn qualify(&mut self, namespace: Option<&str>, local_name: &str) -> (String, Option<(String, String)>) {
        let Some(ns) = namespace else {
            return (local_name.to_string(), None);
        };
        if let Some(prefix) = self.prefix_in_scope(ns) {
            return (format!("{}:{}", prefix, local_name), None);
        }
        let prefix = match self.bindings.prefix_for(ns) {
            Some(prefix) => prefix.to_string(),
            None => {
                self.generated += 1;
                let prefix = format!("ns{}", self.generated);
                self.bindings.bind(prefix.clone(), ns);
                prefix
            }
        };
        (
            format!("{}:{}", prefix, local_name),
            Some((prefix, ns.to_string())),
        )
    }

    fn declare_on_pending(&mut self, prefix: &str, namespace: &str) -> Result<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| Error::Xml("Namespace declared outside of a start tag".to_string()))?;
        let key = format!("xmlns:{}", prefix);
        pending.push_attribute((key.as_str(), namespace));
        if let Some(frame) = self.declared.last_mut() {
            frame.push((prefix.to_string(), namespace.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for XmlEmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlEmitter")
            .field("open", &self.open)
            .field("bindings", &self.bindings)
            .finish()
    }
}
