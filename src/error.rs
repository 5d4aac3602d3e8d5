//! Error types for gmlstream
//!
//! This module defines all error types used throughout the library.
//! Structural problems with the GML document are reported as [`ParseError`],
//! CRS problems get their own [`CrsError`] kind since they point at
//! configuration or data issues rather than malformed XML.

use std::fmt;
use thiserror::Error;

/// Result type alias using the gmlstream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gmlstream operations
#[derive(Error, Debug)]
pub enum Error {
    /// Structural GML parsing error (unexpected element, missing attribute, ...)
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Unknown or missing coordinate reference system
    #[error("CRS error: {0}")]
    Crs(#[from] CrsError),

    /// Coordinate transformation failed
    #[error("transformation error: {0}")]
    Transformation(String),

    /// Operation is not supported
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An identifier is already bound to a different object
    #[error("duplicate identifier '{id}'")]
    DuplicateIdentifier {
        /// The offending identifier
        id: String,
    },

    /// Namespace error
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Name error (invalid XML name or GML id)
    #[error("name error: {0}")]
    Name(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Low-level XML tokenizer error
    #[error("XML error: {0}")]
    Xml(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true for structural parse errors
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    /// Returns true for CRS errors
    pub fn is_crs(&self) -> bool {
        matches!(self, Error::Crs(_))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Structural GML parsing error with context
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location in the input (byte offset, system id)
    pub location: Option<String>,
    /// Element that was being processed
    pub element: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            element: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the element context
    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref element) = self.element {
            write!(f, " (element: {})", element)?;
        }

        if let Some(ref loc) = self.location {
            write!(f, " [at {}]", loc)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Coordinate reference system errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrsError {
    /// The CRS identifier could not be resolved
    #[error("unknown CRS '{0}'")]
    Unknown(String),

    /// Neither an srsName nor a default CRS is available
    #[error("no srsName on element '{element}' and no default CRS configured")]
    Missing {
        /// Element lacking the srsName
        element: String,
    },
}
