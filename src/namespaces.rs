//! XML namespace handling
//!
//! This module provides qualified names (QNames), the scoped prefix
//! declarations tracked while reading, and the prefix bindings used
//! while writing GML.

use crate::error::{Error, Result};
use crate::names::{split_qname, validate_qname};
use crate::version::GmlVersion;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// XML Namespace URI
pub type NamespaceUri = String;

/// Namespace prefix
pub type Prefix = String;

/// GML 2.x / 3.0 / 3.1 namespace
pub const GML_PRE_32_NS: &str = "http://www.opengis.net/gml";

/// GML 3.2 namespace
pub const GML_32_NS: &str = "http://www.opengis.net/gml/3.2";

/// XLink namespace
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// XML Schema instance namespace
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML Schema namespace
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// XML namespace (bound to the `xml` prefix)
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// OGC filter namespace
pub const OGC_NS: &str = "http://www.opengis.net/ogc";

/// WFS 1.x namespace
pub const WFS_NS: &str = "http://www.opengis.net/wfs";

/// WFS 2.0 namespace
pub const WFS_20_NS: &str = "http://www.opengis.net/wfs/2.0";

/// Namespace of extra (non-schema) feature properties
pub const EXTRA_PROPS_NS: &str = "http://www.deegree.org/extra";

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<NamespaceUri>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local_name: local_name.into(),
        }
    }

    /// Namespace URI as a string slice
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Check namespace and local name in one go
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Check whether the name lives in the given namespace
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    /// Parse Clark notation (`{ns}local`) or a plain local name
    pub fn from_clark(text: &str) -> Result<Self> {
        if let Some(rest) = text.strip_prefix('{') {
            let (ns, local) = rest
                .split_once('}')
                .ok_or_else(|| Error::Namespace(format!("Malformed Clark name: {}", text)))?;
            Ok(QName::new(
                if ns.is_empty() { None } else { Some(ns) },
                local,
            ))
        } else {
            Ok(QName::local(text))
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// Namespace context for resolving prefixes
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext {
    /// Mapping from prefix to namespace URI
    prefixes: HashMap<Prefix, NamespaceUri>,
    /// Default namespace (no prefix)
    default_namespace: Option<NamespaceUri>,
}

impl NamespaceContext {
    /// Create a new empty namespace context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace prefix mapping
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    /// Set the default namespace
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) {
        self.default_namespace = Some(namespace.into());
    }

    /// Get the namespace for a prefix
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    /// Get the default namespace
    pub fn get_default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Resolve a prefixed name (e.g. an attribute value such as `gml:PointPropertyType`)
    pub fn resolve(&self, prefixed_name: &str) -> Result<QName> {
        validate_qname(prefixed_name)?;
        match split_qname(prefixed_name) {
            (Some(prefix), local) => {
                let namespace = self
                    .get_namespace(prefix)
                    .ok_or_else(|| Error::Namespace(format!("Unknown prefix: {}", prefix)))?;
                Ok(QName::namespaced(namespace, local))
            }
            (None, local) => Ok(QName::new(self.default_namespace.clone(), local)),
        }
    }
}

/// Stack of namespace declarations, one frame per open element
#[derive(Debug, Clone, Default)]
pub struct NamespaceScopes {
    frames: Vec<Vec<(Option<Prefix>, NamespaceUri)>>,
}

impl NamespaceScopes {
    /// Create an empty scope stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope with the declarations found on a start tag
    pub fn push(&mut self, declarations: Vec<(Option<Prefix>, NamespaceUri)>) {
        self.frames.push(declarations);
    }

    /// Close the innermost scope
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Resolve a prefix (`None` for the default namespace)
    pub fn resolve_prefix(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        for frame in self.frames.iter().rev() {
            for (declared, uri) in frame.iter().rev() {
                if declared.as_deref() == prefix {
                    // xmlns="" undeclares the default namespace
                    return if uri.is_empty() { None } else { Some(uri) };
                }
            }
        }
        None
    }

    /// Snapshot all in-scope declarations
    pub fn context(&self) -> NamespaceContext {
        let mut ctx = NamespaceContext::new();
        for frame in &self.frames {
            for (prefix, uri) in frame {
                match prefix {
                    Some(p) => ctx.add_prefix(p.clone(), uri.clone()),
                    None => ctx.set_default_namespace(uri.clone()),
                }
            }
        }
        ctx
    }
}

/// Prefix bindings used when writing: namespace URI -> preferred prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixBindings {
    by_namespace: IndexMap<NamespaceUri, Prefix>,
}

impl PrefixBindings {
    /// Create an empty binding table
    pub fn new() -> Self {
        Self::default()
    }

    /// Default bindings for the well-known namespaces of the given GML version
    pub fn defaults_for(version: GmlVersion) -> Self {
        let mut bindings = Self::new();
        bindings.bind("gml", version.namespace());
        bindings.bind("xlink", XLINK_NS);
        bindings.bind("xsi", XSI_NS);
        bindings.bind("ogc", OGC_NS);
        bindings.bind("wfs", WFS_NS);
        bindings.bind("dxtra", EXTRA_PROPS_NS);
        bindings
    }

    /// Bind a prefix to a namespace, replacing an earlier binding of either side
    pub fn bind(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        let prefix = prefix.into();
        let namespace = namespace.into();
        self.by_namespace.retain(|_, p| *p != prefix);
        self.by_namespace.insert(namespace, prefix);
    }

    /// Apply overrides given as prefix -> namespace pairs
    pub fn with_overrides<'a>(mut self, overrides: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (prefix, namespace) in overrides {
            self.bind(prefix.clone(), namespace.clone());
        }
        self
    }

    /// Preferred prefix for a namespace
    pub fn prefix_for(&self, namespace: &str) -> Option<&str> {
        self.by_namespace.get(namespace).map(|s| s.as_str())
    }

    /// Namespace bound to a prefix
    pub fn namespace_for(&self, prefix: &str) -> Option<&str> {
        self.by_namespace
            .iter()
            .find(|(_, p)| p.as_str() == prefix)
            .map(|(ns, _)| ns.as_str())
    }

    /// Iterate over (namespace, prefix) pairs in binding order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_namespace.iter().map(|(ns, p)| (ns.as_str(), p.as_str()))
    }
}
