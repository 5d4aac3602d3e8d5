//! Session configuration for the stream reader and writer
//!
//! Both configurations are plain data that can be loaded from JSON. The
//! collaborators that cannot be serialized (schema, CRS registry, resolver,
//! transformer) are skipped and have to be set through the builders.

use crate::crs::{Crs, CrsRegistry, CrsTransformer};
use crate::error::{Error, Result};
use crate::geometry::CoordinateFormatter;
use crate::limits::Limits;
use crate::namespaces::{PrefixBindings, QName};
use crate::reference::{ReferencePatternMatcher, ReferenceResolver};
use crate::schema::ApplicationSchema;
use crate::version::GmlVersion;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

fn default_version() -> GmlVersion {
    GmlVersion::Gml32
}

fn default_xlink_template() -> Option<String> {
    Some("#{}".to_string())
}

// negative values (conventionally -1) mean no expiry
fn expiry_secs<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u64>, D::Error> {
    let secs = Option::<i64>::deserialize(deserializer)?;
    Ok(secs.and_then(|secs| u64::try_from(secs).ok()))
}

fn read_config_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read configuration '{}': {}", path.display(), e)))
}

/// Settings of a read session
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// GML version of the input
    #[serde(default = "default_version")]
    pub version: GmlVersion,
    /// CRS for geometries without `srsName`
    pub default_crs: Option<Crs>,
    /// Coordinate dimension when the document states none
    pub default_dimension: Option<usize>,
    /// Downgrade structural errors to warnings
    pub lax: bool,
    /// Reject duplicate ids instead of keeping the first object
    pub strict_ids: bool,
    /// Regular expressions selecting remote references to dereference
    pub reference_patterns: Vec<String>,
    /// Time allowed for loading one remote document, in seconds; `None`
    /// (or a negative value in JSON) waits forever
    #[serde(deserialize_with = "expiry_secs")]
    pub xlink_expiry_secs: Option<u64>,
    /// Keep streamed collection members resolvable after they were returned
    pub retain_stream_members: bool,
    /// Processing limits
    pub limits: Limits,
    /// Application schema steering feature parsing
    #[serde(skip)]
    pub schema: Option<Rc<ApplicationSchema>>,
    /// Validates `srsName` values
    #[serde(skip)]
    pub crs_registry: Option<Rc<dyn CrsRegistry>>,
    /// Dereferences remote `xlink:href` values
    #[serde(skip)]
    pub resolver: Option<Rc<dyn ReferenceResolver>>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            default_crs: None,
            default_dimension: None,
            lax: false,
            strict_ids: false,
            reference_patterns: Vec::new(),
            xlink_expiry_secs: None,
            retain_stream_members: false,
            limits: Limits::default(),
            schema: None,
            crs_registry: None,
            resolver: None,
        }
    }
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("version", &self.version)
            .field("default_crs", &self.default_crs)
            .field("default_dimension", &self.default_dimension)
            .field("lax", &self.lax)
            .field("strict_ids", &self.strict_ids)
            .field("reference_patterns", &self.reference_patterns)
            .field("xlink_expiry_secs", &self.xlink_expiry_secs)
            .field("retain_stream_members", &self.retain_stream_members)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

impl ReaderConfig {
    /// Defaults for `version`
    pub fn new(version: GmlVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&read_config_file(path.as_ref())?)
    }

    /// Check value ranges and compile the reference patterns once
    pub fn validate(&self) -> Result<()> {
        if let Some(dimension) = self.default_dimension {
            if !(2..=3).contains(&dimension) {
                return Err(Error::Config(format!(
                    "Default dimension must be 2 or 3, got {}",
                    dimension
                )));
            }
        }
        self.reference_matcher()?;
        Ok(())
    }

    /// Set the GML version
    pub fn with_version(mut self, version: GmlVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the default CRS
    pub fn with_default_crs(mut self, crs: Option<Crs>) -> Self {
        self.default_crs = crs;
        self
    }

    /// Set the default coordinate dimension
    pub fn with_default_dimension(mut self, dimension: Option<usize>) -> Self {
        self.default_dimension = dimension;
        self
    }

    /// Enable lax mode
    pub fn with_lax(mut self, lax: bool) -> Self {
        self.lax = lax;
        self
    }

    /// Enable strict id uniqueness
    pub fn with_strict_ids(mut self, strict: bool) -> Self {
        self.strict_ids = strict;
        self
    }

    /// Add a pattern selecting remote references to dereference
    pub fn with_reference_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.reference_patterns.push(pattern.into());
        self
    }

    /// Set the remote load expiry
    pub fn with_xlink_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.xlink_expiry_secs = expiry.map(|d| d.as_secs());
        self
    }

    /// Keep streamed members in the identity context
    pub fn with_retain_stream_members(mut self, retain: bool) -> Self {
        self.retain_stream_members = retain;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the application schema
    pub fn with_schema(mut self, schema: ApplicationSchema) -> Self {
        self.schema = Some(Rc::new(schema));
        self
    }

    /// Set the CRS registry
    pub fn with_crs_registry(mut self, registry: Rc<dyn CrsRegistry>) -> Self {
        self.crs_registry = Some(registry);
        self
    }

    /// Set the remote reference resolver
    pub fn with_resolver(mut self, resolver: Rc<dyn ReferenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Remote load expiry as a duration
    pub fn xlink_expiry(&self) -> Option<Duration> {
        self.xlink_expiry_secs.map(Duration::from_secs)
    }

    /// Compiled reference patterns, if any were configured
    pub fn reference_matcher(&self) -> Result<Option<ReferencePatternMatcher>> {
        if self.reference_patterns.is_empty() {
            return Ok(None);
        }
        ReferencePatternMatcher::new(self.reference_patterns.as_slice()).map(Some)
    }
}

/// Settings of a write session
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// GML version of the output
    #[serde(default = "default_version")]
    pub version: GmlVersion,
    /// CRS geometries are reprojected to
    pub output_crs: Option<Crs>,
    /// Ordinate formatting
    pub formatter: CoordinateFormatter,
    /// Prefix to namespace bindings layered over the defaults
    pub namespace_bindings: IndexMap<String, String>,
    /// Nested feature levels written inline; `None` writes all of them
    pub xlink_depth: Option<u32>,
    /// Fetch remote references that fall within the xlink depth and write them inline
    pub traverse_remote_references: bool,
    /// Seconds a traversed remote reference may take to load; `None` waits forever
    #[serde(deserialize_with = "expiry_secs")]
    pub xlink_expiry_secs: Option<u64>,
    /// Properties written for top-level features
    pub projection: Option<Vec<QName>>,
    /// URI template for features below the xlink depth, `{}` stands for the id
    #[serde(default = "default_xlink_template")]
    pub remote_xlink_template: Option<String>,
    /// Write properties outside the feature type
    pub export_extra_properties: bool,
    /// Write a computed `gml:boundedBy` where none is present
    pub generate_bounded_by: bool,
    /// Start the document with an XML declaration
    pub write_declaration: bool,
    /// Indentation width; `None` writes everything on one line
    pub indent: Option<usize>,
    /// Reprojection service
    #[serde(skip)]
    pub transformer: Option<Rc<dyn CrsTransformer>>,
    /// Resolver for traversed remote references; a document loader is used when unset
    #[serde(skip)]
    pub resolver: Option<Rc<dyn ReferenceResolver>>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            output_crs: None,
            formatter: CoordinateFormatter::default(),
            namespace_bindings: IndexMap::new(),
            xlink_depth: None,
            traverse_remote_references: false,
            xlink_expiry_secs: None,
            projection: None,
            remote_xlink_template: default_xlink_template(),
            export_extra_properties: false,
            generate_bounded_by: false,
            write_declaration: false,
            indent: None,
            transformer: None,
            resolver: None,
        }
    }
}

impl fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterConfig")
            .field("version", &self.version)
            .field("output_crs", &self.output_crs)
            .field("formatter", &self.formatter)
            .field("namespace_bindings", &self.namespace_bindings)
            .field("xlink_depth", &self.xlink_depth)
            .field("traverse_remote_references", &self.traverse_remote_references)
            .field("xlink_expiry_secs", &self.xlink_expiry_secs)
            .field("projection", &self.projection)
            .field("remote_xlink_template", &self.remote_xlink_template)
            .field("indent", &self.indent)
            .finish()
    }
}

impl WriterConfig {
    /// Defaults for `version`
    pub fn new(version: GmlVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&read_config_file(path.as_ref())?)
    }

    /// Set the GML version
    pub fn with_version(mut self, version: GmlVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the output CRS
    pub fn with_output_crs(mut self, crs: Option<Crs>) -> Self {
        self.output_crs = crs;
        self
    }

    /// Set the ordinate formatter
    pub fn with_formatter(mut self, formatter: CoordinateFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Bind `prefix` to `namespace` in the output
    pub fn with_namespace_binding(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.namespace_bindings.insert(prefix.into(), namespace.into());
        self
    }

    /// Set the xlink inline depth
    pub fn with_xlink_depth(mut self, depth: Option<u32>) -> Self {
        self.xlink_depth = depth;
        self
    }

    /// Fetch remote references within the xlink depth
    pub fn with_traverse_remote_references(mut self, traverse: bool) -> Self {
        self.traverse_remote_references = traverse;
        self
    }

    /// Set how long one traversed remote reference may take to load
    pub fn with_xlink_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.xlink_expiry_secs = expiry.map(|d| d.as_secs());
        self
    }

    /// Restrict top-level properties to `names`
    pub fn with_projection(mut self, names: Vec<QName>) -> Self {
        self.projection = Some(names);
        self
    }

    /// Set the remote xlink template
    pub fn with_remote_xlink_template(mut self, template: Option<String>) -> Self {
        self.remote_xlink_template = template;
        self
    }

    /// Write extra properties
    pub fn with_export_extra_properties(mut self, export: bool) -> Self {
        self.export_extra_properties = export;
        self
    }

    /// Generate `gml:boundedBy`
    pub fn with_generate_bounded_by(mut self, generate: bool) -> Self {
        self.generate_bounded_by = generate;
        self
    }

    /// Write an XML declaration
    pub fn with_declaration(mut self, write: bool) -> Self {
        self.write_declaration = write;
        self
    }

    /// Indent nested elements
    pub fn with_indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }

    /// Set the reprojection service
    pub fn with_transformer(mut self, transformer: Rc<dyn CrsTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Resolve traversed remote references with `resolver`
    pub fn with_resolver(mut self, resolver: Rc<dyn ReferenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self.traverse_remote_references = true;
        self
    }

    /// Load timeout for traversed remote references
    pub fn xlink_expiry(&self) -> Option<Duration> {
        self.xlink_expiry_secs.map(Duration::from_secs)
    }

    /// Effective prefix bindings
    pub fn prefix_bindings(&self) -> PrefixBindings {
        PrefixBindings::defaults_for(self.version).with_overrides(&self.namespace_bindings)
    }
}
