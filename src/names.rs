//! XML name validation and utilities
//!
//! This module provides validation for NCNames and QNames, and for the
//! identifiers carried in `gml:id`, `fid` and `gid` attributes.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

// gml:id, fid and gid are xs:ID values: no leading digit, no separating colon
static GML_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\d:][^:]*$").unwrap());

/// Check if a string is a valid XML Name
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    name.chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    if name.is_empty() || name.contains(':') {
        return false;
    }

    is_valid_name(name)
}

/// Check if a string is a valid QName (qualified name)
pub fn is_valid_qname(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    if let Some((prefix, local)) = name.split_once(':') {
        is_valid_ncname(prefix) && is_valid_ncname(local)
    } else {
        is_valid_ncname(name)
    }
}

/// Check if a string is usable as a GML object identifier
pub fn is_valid_gml_id(id: &str) -> bool {
    GML_ID.is_match(id)
}

/// Validate a GML object identifier and return an error if invalid
pub fn validate_gml_id(id: &str) -> Result<()> {
    if is_valid_gml_id(id) {
        Ok(())
    } else {
        Err(Error::Name(format!(
            "'{}' is not a valid GML id. A GML id must not start with a digit and may not contain a separating colon (:).",
            id
        )))
    }
}

/// Validate a QName and return an error if invalid
pub fn validate_qname(name: &str) -> Result<()> {
    if is_valid_qname(name) {
        Ok(())
    } else {
        Err(Error::Name(format!("Invalid QName: '{}'", name)))
    }
}

/// Split a QName into prefix and local name
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    if let Some((prefix, local)) = qname.split_once(':') {
        (Some(prefix), local)
    } else {
        (None, qname)
    }
}
