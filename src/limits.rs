//! Limits and constraints for GML processing
//!
//! This module defines limits that keep a single read session from
//! exhausting memory on hostile or broken input: deeply nested elements,
//! huge coordinate lists, runaway numbers of unresolved references and
//! oversized remote documents.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Global limits configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum element nesting depth
    pub max_xml_depth: usize,

    /// Maximum number of coordinate tuples in a single coordinate element
    pub max_tuples: usize,

    /// Maximum number of references tracked by one identity context
    pub max_references: usize,

    /// Maximum size of a dereferenced document in bytes
    pub max_document_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_tuples: 10_000_000,
            max_references: 1_000_000,
            max_document_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_tuples: 100_000,
            max_references: 10_000,
            max_document_size: 10 * 1024 * 1024, // 10 MB
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10000,
            max_tuples: usize::MAX,
            max_references: usize::MAX,
            max_document_size: 1024 * 1024 * 1024, // 1 GB
        }
    }

    /// Check if XML depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_xml_depth {
            Err(Error::LimitExceeded(format!(
                "XML depth {} exceeds maximum {}",
                depth, self.max_xml_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a coordinate tuple count is within limits
    pub fn check_tuples(&self, count: usize) -> Result<()> {
        if count > self.max_tuples {
            Err(Error::LimitExceeded(format!(
                "Coordinate tuple count {} exceeds maximum {}",
                count, self.max_tuples
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the number of tracked references is within limits
    pub fn check_references(&self, count: usize) -> Result<()> {
        if count > self.max_references {
            Err(Error::LimitExceeded(format!(
                "Reference count {} exceeds maximum {}",
                count, self.max_references
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a loaded document size is within limits
    pub fn check_document_size(&self, size: usize) -> Result<()> {
        if size > self.max_document_size {
            Err(Error::LimitExceeded(format!(
                "Document size {} bytes exceeds maximum {} bytes",
                size, self.max_document_size
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_xml_depth, 1000);
        assert!(limits.check_xml_depth(500).is_ok());
        assert!(limits.check_xml_depth(1500).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_xml_depth < Limits::default().max_xml_depth);
        assert!(limits.check_xml_depth(150).is_err());
        assert!(limits.check_tuples(200_000).is_err());
    }

    #[test]
    fn test_permissive_limits() {
        let limits = Limits::permissive();
        assert!(limits.max_xml_depth > Limits::default().max_xml_depth);
        assert!(limits.check_xml_depth(5000).is_ok());
        assert!(limits.check_references(50_000_000).is_ok());
    }

    #[test]
    fn test_check_document_size() {
        let limits = Limits::default();
        assert!(limits.check_document_size(1024).is_ok());
        assert!(limits.check_document_size(200 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_partial_json() {
        let limits: Limits = serde_json::from_str(r#"{"max_xml_depth": 12}"#).unwrap();
        assert_eq!(limits.max_xml_depth, 12);
        assert_eq!(limits.max_tuples, Limits::default().max_tuples);
    }
}
