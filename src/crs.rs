//! Coordinate reference systems
//!
//! The codecs only need to recognize CRS identifiers and hand geometries
//! to an external reprojection service. [`CrsRegistry`] decides which
//! `srsName` values are acceptable, [`CrsTransformer`] performs the math.

use crate::error::{CrsError, Result};
use crate::geometry::Geometry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

static EPSG_FORMS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?i)EPSG:\d+$",
        r"^(?i)urn:ogc:def:crs:EPSG:[0-9.]*:\d+$",
        r"^(?i)urn:x-ogc:def:crs:EPSG:[0-9.]*:?\d+$",
        r"^(?i)https?://www\.opengis\.net/def/crs/EPSG/\d+/\d+$",
        r"^(?i)https?://www\.opengis\.net/gml/srs/epsg\.xml#\d+$",
        r"^(?i)CRS:84$",
        r"^(?i)urn:ogc:def:crs:OGC:[0-9.]*:CRS84$",
        r"^(?i)https?://www\.opengis\.net/def/crs/OGC/[0-9.]+/CRS84$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Identifier of a coordinate reference system, kept as written
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    /// Wrap an identifier without validating it
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identifier as written in `srsName`
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Crs {
    fn from(name: &str) -> Self {
        Crs::new(name)
    }
}

/// Resolves `srsName` values to CRS handles
pub trait CrsRegistry: fmt::Debug {
    /// Look up a CRS by identifier
    fn lookup(&self, name: &str) -> Result<Crs>;
}

/// Registry accepting the common EPSG and OGC identifier forms
#[derive(Debug, Clone, Default)]
pub struct DefaultCrsRegistry {
    extra: HashSet<String>,
}

impl DefaultCrsRegistry {
    /// Create a registry knowing only the built-in identifier forms
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional identifier
    pub fn register(&mut self, name: impl Into<String>) {
        self.extra.insert(name.into());
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_crs(mut self, name: impl Into<String>) -> Self {
        self.register(name);
        self
    }
}

impl CrsRegistry for DefaultCrsRegistry {
    fn lookup(&self, name: &str) -> Result<Crs> {
        let name = name.trim();
        if self.extra.contains(name) || EPSG_FORMS.iter().any(|re| re.is_match(name)) {
            Ok(Crs::new(name))
        } else {
            Err(CrsError::Unknown(name.to_string()).into())
        }
    }
}

/// External reprojection service
pub trait CrsTransformer: fmt::Debug {
    /// Transform a geometry into the target CRS
    fn transform(&self, geometry: &Geometry, target: &Crs) -> Result<Geometry>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_forms() {
        let registry = DefaultCrsRegistry::new();
        for name in [
            "EPSG:4326",
            "urn:ogc:def:crs:EPSG::4326",
            "urn:ogc:def:crs:EPSG:6.6:4326",
            "urn:x-ogc:def:crs:EPSG:4326",
            "http://www.opengis.net/def/crs/EPSG/0/25832",
            "http://www.opengis.net/gml/srs/epsg.xml#4326",
            "CRS:84",
            "urn:ogc:def:crs:OGC:1.3:CRS84",
        ] {
            assert_eq!(registry.lookup(name).unwrap().name(), name);
        }
    }

    #[test]
    fn test_unknown_crs() {
        let registry = DefaultCrsRegistry::new();
        let err = registry.lookup("EPSG:abc").unwrap_err();
        assert!(err.is_crs());
    }

    #[test]
    fn test_registered_crs() {
        let registry = DefaultCrsRegistry::new().with_crs("LOCAL:grid");
        assert!(registry.lookup("LOCAL:grid").is_ok());
    }
}
