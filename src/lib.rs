//! # gmlstream
//!
//! A streaming reader and writer for GML (Geography Markup Language) 2.1.2,
//! 3.0.1, 3.1.1 and 3.2.1 documents.
//!
//! ## Features
//!
//! - Geometry codecs for GML 2 and GML 3 (points, curves, surfaces,
//!   envelopes, aggregates)
//! - Feature and feature collection codecs, optionally steered by an
//!   application schema decoded from XSD
//! - Streaming iteration over large feature collections
//! - `xlink:href` resolution within a document and across documents
//! - Depth-limited xlink expansion and de-duplication on write
//! - GML version negotiation from MIME types
//!
//! ## Example
//!
//! ```rust,ignore
//! use gmlstream::{GmlStreamReader, GmlStreamWriter, ReaderConfig, WriterConfig, GmlVersion};
//!
//! let mut reader = GmlStreamReader::from_file("roads.gml", ReaderConfig::new(GmlVersion::Gml31))?;
//! let object = reader.read()?;
//! let dangling = reader.close();
//!
//! let mut writer = GmlStreamWriter::new(std::io::stdout(), WriterConfig::new(GmlVersion::Gml32));
//! writer.write(&object)?;
//! writer.finish()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names, locations and resource loading
pub mod namespaces;
pub mod names;
pub mod locations;
pub mod loaders;
pub mod documents;

// GML model
pub mod version;
pub mod crs;
pub mod xml;
pub mod geometry;
pub mod reference;
pub mod dictionary;
pub mod feature;
pub mod schema;

// Session facade
pub mod config;
pub mod stream;

// Re-exports for convenience
pub use config::{ReaderConfig, WriterConfig};
pub use crs::{Crs, CrsRegistry, CrsTransformer, DefaultCrsRegistry};
pub use error::{CrsError, Error, ParseError, Result};
pub use feature::{Feature, FeatureCollection, FeatureMember, FeatureStream, Property, PropertyValue};
pub use geometry::{Envelope, Geometry, GeometryKind};
pub use namespaces::QName;
pub use reference::{DocumentIdContext, GmlObject, GmlReference};
pub use schema::ApplicationSchema;
pub use stream::{GmlStreamReader, GmlStreamWriter};
pub use version::GmlVersion;

/// Version of the gmlstream library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
