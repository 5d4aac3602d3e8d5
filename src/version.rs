//! GML versions
//!
//! The closed set of supported GML dialects, their namespaces and MIME types,
//! and negotiation of a version from a MIME type string.

use crate::namespaces::{GML_32_NS, GML_PRE_32_NS};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static MIME_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:subtype\s*=\s*"?gml/|version\s*=\s*"?)([0-9][0-9A-Za-z.]*)"#).unwrap()
});

/// Supported GML versions, ordered from oldest to newest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GmlVersion {
    /// GML 2.1.2
    #[serde(rename = "2.1.2", alias = "2")]
    Gml2,
    /// GML 3.0.1
    #[serde(rename = "3.0.1", alias = "3.0")]
    Gml30,
    /// GML 3.1.1
    #[serde(rename = "3.1.1", alias = "3.1")]
    Gml31,
    /// GML 3.2.1
    #[serde(rename = "3.2.1", alias = "3.2")]
    Gml32,
}

impl GmlVersion {
    /// All versions, oldest first
    pub const ALL: [GmlVersion; 4] = [
        GmlVersion::Gml2,
        GmlVersion::Gml30,
        GmlVersion::Gml31,
        GmlVersion::Gml32,
    ];

    /// Canonical namespace URI
    pub fn namespace(&self) -> &'static str {
        match self {
            GmlVersion::Gml32 => GML_32_NS,
            _ => GML_PRE_32_NS,
        }
    }

    /// Current-style MIME type (`application/gml+xml; version=X.Y`)
    pub fn mime_type(&self) -> &'static str {
        match self {
            GmlVersion::Gml2 => "application/gml+xml; version=2.1",
            GmlVersion::Gml30 => "application/gml+xml; version=3.0",
            GmlVersion::Gml31 => "application/gml+xml; version=3.1",
            GmlVersion::Gml32 => "application/gml+xml; version=3.2",
        }
    }

    /// Legacy MIME type (`text/xml; subtype=gml/X.Y.Z`)
    pub fn mime_type_old_style(&self) -> &'static str {
        match self {
            GmlVersion::Gml2 => "text/xml; subtype=gml/2.1.2",
            GmlVersion::Gml30 => "text/xml; subtype=gml/3.0.1",
            GmlVersion::Gml31 => "text/xml; subtype=gml/3.1.1",
            GmlVersion::Gml32 => "text/xml; subtype=gml/3.2.1",
        }
    }

    /// Full version number
    pub fn version_number(&self) -> (u32, u32, u32) {
        match self {
            GmlVersion::Gml2 => (2, 1, 2),
            GmlVersion::Gml30 => (3, 0, 1),
            GmlVersion::Gml31 => (3, 1, 1),
            GmlVersion::Gml32 => (3, 2, 1),
        }
    }

    /// True for GML 2 (flat geometry vocabulary)
    pub fn is_gml2(&self) -> bool {
        *self == GmlVersion::Gml2
    }

    /// True for the versions sharing the pre-3.2 namespace
    pub fn is_pre_32(&self) -> bool {
        *self != GmlVersion::Gml32
    }

    /// Determine the version from a MIME type string.
    ///
    /// Both `application/gml+xml; version=X.Y` and `text/xml; subtype=gml/X.Y.Z`
    /// are understood. A requested version without an exact match rounds up to
    /// the next known version; anything above the newest version, anything
    /// malformed, or a missing version yields `default`.
    pub fn from_mime_type(mime_type: &str, default: GmlVersion) -> GmlVersion {
        let Some(requested) = MIME_VERSION
            .captures(mime_type)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_version_number(m.as_str()))
        else {
            return default;
        };

        GmlVersion::ALL
            .iter()
            .copied()
            .find(|v| v.version_number() >= requested)
            .unwrap_or(default)
    }
}

fn parse_version_number(text: &str) -> Option<(u32, u32, u32)> {
    let text = text.trim_end_matches('.');
    let mut parts = text.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

impl fmt::Display for GmlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.version_number();
        write!(f, "{}.{}.{}", major, minor, patch)
    }
}

impl FromStr for GmlVersion {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_start_matches("gml") {
            "2" | "2.1" | "2.1.2" | "_2" => Ok(GmlVersion::Gml2),
            "3.0" | "3.0.1" | "30" | "_30" => Ok(GmlVersion::Gml30),
            "3.1" | "3.1.1" | "31" | "_31" => Ok(GmlVersion::Gml31),
            "3.2" | "3.2.1" | "32" | "_32" => Ok(GmlVersion::Gml32),
            other => Err(crate::error::Error::Config(format!(
                "Unknown GML version: {}",
                other
            ))),
        }
    }
}
