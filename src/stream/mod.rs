//! Stream reader and writer facades
//!
//! [`GmlStreamReader`] and [`GmlStreamWriter`] hold the configuration of one
//! session and build every codec from it up front. Reading classifies the
//! element at the cursor and hands it to the geometry, feature or dictionary
//! codec; writing dispatches on the object type.

pub mod reader;
pub mod resolver;
pub mod writer;

pub use reader::GmlStreamReader;
pub use resolver::DocumentResolver;
pub use writer::{CollectionWriter, GmlStreamWriter};
