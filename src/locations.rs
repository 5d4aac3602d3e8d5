//! Resource location resolution
//!
//! This module handles resolution of resource locations (URLs, file paths,
//! in-memory content) and the parsing of `xlink:href` values into local and
//! remote references.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Resource location - can be a URL, file path, or in-memory content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, file, ...)
    Url(Url),
    /// In-memory document content
    String(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn from_str(s: &str) -> Result<Self> {
        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                return url
                    .to_file_path()
                    .map(Location::Path)
                    .map_err(|_| Error::Resource(format!("Invalid file URL: {}", s)));
            }
            // single letters are drive names, not schemes
            if url.scheme().len() > 1 {
                return Ok(Location::Url(url));
            }
        }

        let trimmed = s.trim_start();
        if trimmed.starts_with('<') {
            return Ok(Location::String(s.to_string()));
        }

        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Resolve a possibly relative reference against a base system id
    pub fn resolve(reference: &str, base: Option<&str>) -> Result<Self> {
        if Url::parse(reference).is_ok() {
            return Self::from_str(reference);
        }
        let Some(base) = base else {
            return Self::from_str(reference);
        };
        match Url::parse(base) {
            Ok(base_url) => Self::from_str(base_url.join(reference)?.as_str()),
            Err(_) => {
                let base_path = PathBuf::from(base);
                let dir = base_path.parent().map(PathBuf::from).unwrap_or_default();
                Ok(Location::Path(dir.join(reference)))
            }
        }
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::String(s) => s.clone(),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

/// Parsed `xlink:href` value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Href {
    /// Same-document reference (`#id`)
    Local {
        /// Referenced object id
        id: String,
    },
    /// Reference into another document, optionally to a fragment
    Remote {
        /// Document URI, possibly relative
        uri: String,
        /// Fragment identifier after `#`
        fragment: Option<String>,
    },
}

impl Href {
    /// Parse an `xlink:href` attribute value
    pub fn parse(href: &str) -> Result<Self> {
        let href = href.trim();
        if href.is_empty() {
            return Err(Error::Other("Empty xlink:href".to_string()));
        }
        if let Some(id) = href.strip_prefix('#') {
            if id.is_empty() {
                return Err(Error::Other(format!("Invalid xlink:href '{}'", href)));
            }
            return Ok(Href::Local { id: id.to_string() });
        }
        Ok(match href.split_once('#') {
            Some((uri, fragment)) => Href::Remote {
                uri: uri.to_string(),
                fragment: if fragment.is_empty() {
                    None
                } else {
                    Some(fragment.to_string())
                },
            },
            None => Href::Remote {
                uri: href.to_string(),
                fragment: None,
            },
        })
    }

    /// Check for a same-document reference
    pub fn is_local(&self) -> bool {
        matches!(self, Href::Local { .. })
    }

    /// Object id this reference points at, if it names one
    pub fn id(&self) -> Option<&str> {
        match self {
            Href::Local { id } => Some(id),
            Href::Remote { fragment, .. } => fragment.as_deref(),
        }
    }

    /// Location of the referenced document, resolved against `base`
    pub fn document_location(&self, base: Option<&str>) -> Option<Result<Location>> {
        match self {
            Href::Local { .. } => None,
            Href::Remote { uri, .. } => Some(Location::resolve(uri, base)),
        }
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Href::Local { id } => write!(f, "#{}", id),
            Href::Remote {
                uri,
                fragment: Some(fragment),
            } => write!(f, "{}#{}", uri, fragment),
            Href::Remote { uri, fragment: None } => write!(f, "{}", uri),
        }
    }
}
