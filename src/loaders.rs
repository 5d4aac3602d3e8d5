//! Resource loading utilities
//!
//! This module loads documents referenced by remote `xlink:href` values.
//! Files are read directly; `http`/`https` documents are fetched with a
//! blocking `reqwest` client (feature `http`) whose timeout is the xlink
//! expiry. Every document is checked against [`Limits::max_document_size`].

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Resource loader for referenced documents
#[derive(Debug, Clone)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
    /// Whether to allow remote resources
    allow_remote: bool,
    /// How long a single fetch may take (`None` waits forever)
    expiry: Option<Duration>,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            allow_remote: true,
            expiry: None,
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set whether to allow remote resources
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Set the fetch expiry
    pub fn with_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.expiry = expiry;
        self
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        let content = match location {
            Location::Path(path) => read_file(path)?,
            Location::Url(url) => {
                if !self.allow_remote {
                    return Err(Error::Resource(
                        "Remote resources are not allowed".to_string(),
                    ));
                }
                match url.scheme() {
                    "http" | "https" => self.fetch(url)?,
                    scheme => {
                        return Err(Error::Resource(format!(
                            "Unsupported URL scheme '{}': {}",
                            scheme, url
                        )))
                    }
                }
            }
            Location::String(s) => s.clone(),
        };

        self.limits.check_document_size(content.len())?;
        Ok(content)
    }

    #[cfg(feature = "http")]
    fn fetch(&self, url: &Url) -> Result<String> {
        use std::io::Read;

        tracing::debug!(%url, expiry = ?self.expiry, "fetching referenced document");
        let client = reqwest::blocking::Client::builder()
            .timeout(self.expiry)
            .build()
            .map_err(|e| Error::Resource(format!("Failed to create HTTP client: {}", e)))?;
        let response = client
            .get(url.as_str())
            .send()
            .map_err(|e| Error::Resource(format!("Failed to fetch '{}': {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Resource(format!(
                "Fetching '{}' failed with status {}",
                url, status
            )));
        }
        if let Some(length) = response.content_length() {
            self.limits
                .check_document_size(usize::try_from(length).unwrap_or(usize::MAX))?;
        }

        // one byte over the limit is enough to reject the document
        let cap = u64::try_from(self.limits.max_document_size)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let mut body = Vec::new();
        response
            .take(cap)
            .read_to_end(&mut body)
            .map_err(|e| Error::Resource(format!("Failed to read '{}': {}", url, e)))?;
        self.limits.check_document_size(body.len())?;

        String::from_utf8(body)
            .map_err(|e| Error::Resource(format!("Document '{}' is not valid UTF-8: {}", url, e)))
    }

    #[cfg(not(feature = "http"))]
    fn fetch(&self, url: &Url) -> Result<String> {
        Err(Error::Resource(format!(
            "Unsupported resource (built without the 'http' feature): {}",
            url
        )))
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Resource(format!("Failed to read file '{}': {}", path.display(), e)))
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
