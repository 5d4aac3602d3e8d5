//! Low-level XML access
//!
//! [`XmlCursor`] is the forward-only pull cursor every reader in this crate
//! works on, [`XmlEmitter`] the matching writer side. Both wrap `quick-xml`
//! and add namespace tracking.

pub mod cursor;
pub mod emitter;

pub use cursor::{Attribute, StartElement, XmlCursor, XmlEvent};
pub use emitter::XmlEmitter;
