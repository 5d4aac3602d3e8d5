//! Object identity and cross references
//!
//! A [`DocumentIdContext`] lives for one read or write session. It maps
//! `gml:id` values to the objects parsed so far and keeps every
//! [`GmlReference`] created from an `xlink:href`. References to ids that are
//! already known resolve immediately; all others stay pending until
//! [`DocumentIdContext::resolve_references`] runs at the end of the document.
//! A reference shares its resolution cell with every clone, so patching it
//! once is visible wherever it was stored.

use crate::dictionary::{Definition, Dictionary};
use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureCollection};
use crate::geometry::Geometry;
use crate::limits::Limits;
use crate::locations::Href;
use crate::version::GmlVersion;
use indexmap::IndexMap;
use regex::Regex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Any identifiable GML object
#[derive(Debug, Clone)]
pub enum GmlObject {
    /// Feature
    Feature(Rc<Feature>),
    /// Feature collection
    FeatureCollection(Rc<FeatureCollection>),
    /// Geometry
    Geometry(Rc<Geometry>),
    /// Dictionary entry
    Definition(Rc<Definition>),
    /// Dictionary
    Dictionary(Rc<Dictionary>),
}

impl GmlObject {
    /// Object id
    pub fn id(&self) -> Option<&str> {
        match self {
            GmlObject::Feature(f) => f.id.as_deref(),
            GmlObject::FeatureCollection(c) => c.id.as_deref(),
            GmlObject::Geometry(g) => g.id(),
            GmlObject::Definition(d) => Some(d.id.as_str()),
            GmlObject::Dictionary(d) => Some(d.id.as_str()),
        }
    }

    /// Category used to check references against their target
    pub fn category(&self) -> ObjectCategory {
        match self {
            GmlObject::Feature(_) | GmlObject::FeatureCollection(_) => ObjectCategory::Feature,
            GmlObject::Geometry(_) => ObjectCategory::Geometry,
            GmlObject::Definition(_) | GmlObject::Dictionary(_) => ObjectCategory::Definition,
        }
    }

    /// True if both handles point at the same in-memory object
    pub fn same_object(&self, other: &GmlObject) -> bool {
        match (self, other) {
            (GmlObject::Feature(a), GmlObject::Feature(b)) => Rc::ptr_eq(a, b),
            (GmlObject::FeatureCollection(a), GmlObject::FeatureCollection(b)) => Rc::ptr_eq(a, b),
            (GmlObject::Geometry(a), GmlObject::Geometry(b)) => Rc::ptr_eq(a, b),
            (GmlObject::Definition(a), GmlObject::Definition(b)) => Rc::ptr_eq(a, b),
            (GmlObject::Dictionary(a), GmlObject::Dictionary(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Handle to an object the context no longer keeps alive
#[derive(Debug, Clone)]
enum ReleasedObject {
    Feature(Weak<Feature>),
    FeatureCollection(Weak<FeatureCollection>),
    Geometry(Weak<Geometry>),
    Definition(Weak<Definition>),
    Dictionary(Weak<Dictionary>),
}

impl ReleasedObject {
    fn new(object: &GmlObject) -> Self {
        match object {
            GmlObject::Feature(f) => ReleasedObject::Feature(Rc::downgrade(f)),
            GmlObject::FeatureCollection(c) => ReleasedObject::FeatureCollection(Rc::downgrade(c)),
            GmlObject::Geometry(g) => ReleasedObject::Geometry(Rc::downgrade(g)),
            GmlObject::Definition(d) => ReleasedObject::Definition(Rc::downgrade(d)),
            GmlObject::Dictionary(d) => ReleasedObject::Dictionary(Rc::downgrade(d)),
        }
    }

    fn upgrade(&self) -> Option<GmlObject> {
        match self {
            ReleasedObject::Feature(f) => f.upgrade().map(GmlObject::Feature),
            ReleasedObject::FeatureCollection(c) => c.upgrade().map(GmlObject::FeatureCollection),
            ReleasedObject::Geometry(g) => g.upgrade().map(GmlObject::Geometry),
            ReleasedObject::Definition(d) => d.upgrade().map(GmlObject::Definition),
            ReleasedObject::Dictionary(d) => d.upgrade().map(GmlObject::Dictionary),
        }
    }
}

/// What a reference is expected to point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    /// Feature or feature collection
    Feature,
    /// Geometry
    Geometry,
    /// Definition or dictionary
    Definition,
    /// Anything
    Any,
}

impl ObjectCategory {
    /// Whether an object of category `actual` satisfies this expectation
    pub fn accepts(self, actual: ObjectCategory) -> bool {
        self == ObjectCategory::Any || self == actual
    }
}

/// State of a reference
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Bound to an object
    Resolved(GmlObject),
    /// Not bound yet; carries the referenced id or URI
    Pending(String),
}

/// Reference created from an `xlink:href`
#[derive(Clone)]
pub struct GmlReference {
    uri: String,
    href: Href,
    expected: ObjectCategory,
    cell: Rc<RefCell<Resolution>>,
}

impl GmlReference {
    fn new(uri: &str, href: Href, expected: ObjectCategory) -> Self {
        Self {
            uri: uri.to_string(),
            cell: Rc::new(RefCell::new(Resolution::Pending(uri.to_string()))),
            href,
            expected,
        }
    }

    /// The `xlink:href` value as written
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Parsed form of the href
    pub fn href(&self) -> &Href {
        &self.href
    }

    /// Referenced object id, if the href names one
    pub fn id(&self) -> Option<&str> {
        self.href.id()
    }

    /// Expected target category
    pub fn expected(&self) -> ObjectCategory {
        self.expected
    }

    /// True for same-document references
    pub fn is_local(&self) -> bool {
        self.href.is_local()
    }

    /// True once the reference is bound
    pub fn is_resolved(&self) -> bool {
        matches!(*self.cell.borrow(), Resolution::Resolved(_))
    }

    /// Current state
    pub fn resolution(&self) -> Resolution {
        self.cell.borrow().clone()
    }

    /// The bound object
    pub fn object(&self) -> Option<GmlObject> {
        match &*self.cell.borrow() {
            Resolution::Resolved(object) => Some(object.clone()),
            Resolution::Pending(_) => None,
        }
    }

    /// The bound feature
    pub fn feature(&self) -> Option<Rc<Feature>> {
        match self.object() {
            Some(GmlObject::Feature(feature)) => Some(feature),
            _ => None,
        }
    }

    /// The bound geometry
    pub fn geometry(&self) -> Option<Rc<Geometry>> {
        match self.object() {
            Some(GmlObject::Geometry(geometry)) => Some(geometry),
            _ => None,
        }
    }

    /// Bind the reference; fails if the object has the wrong category
    pub fn resolve(&self, object: GmlObject) -> Result<()> {
        if !self.expected.accepts(object.category()) {
            return Err(Error::Other(format!(
                "Reference '{}' expects a {:?} but points at a {:?}",
                self.uri,
                self.expected,
                object.category()
            )));
        }
        *self.cell.borrow_mut() = Resolution::Resolved(object);
        Ok(())
    }

    /// True if both handles share one resolution cell
    pub fn same_reference(&self, other: &GmlReference) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for GmlReference {
    // resolved objects may refer back to this reference
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmlReference")
            .field("uri", &self.uri)
            .field("expected", &self.expected)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Decides which remote references are worth dereferencing
#[derive(Debug, Clone, Default)]
pub struct ReferencePatternMatcher {
    patterns: Vec<Regex>,
}

impl ReferencePatternMatcher {
    /// Compile a set of URI patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    Error::Config(format!("Invalid reference pattern '{}': {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// True if any pattern matches the URI
    pub fn matches(&self, uri: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(uri))
    }
}

/// Fetches objects from other documents
pub trait ReferenceResolver: fmt::Debug {
    /// Dereference `uri`, relative to `base` when given
    fn resolve(&self, uri: &str, base: Option<&str>) -> Result<Option<GmlObject>>;
}

/// Identity registry of one read or write session
#[derive(Debug)]
pub struct DocumentIdContext {
    version: GmlVersion,
    objects: IndexMap<String, GmlObject>,
    // defined earlier in the session but no longer held, e.g. streamed members
    released: HashMap<String, ReleasedObject>,
    references: Vec<GmlReference>,
    strict_ids: bool,
    matcher: Option<ReferencePatternMatcher>,
    resolver: Option<Rc<dyn ReferenceResolver>>,
    exported: HashSet<String>,
    limits: Limits,
    system_id: Option<String>,
}

impl DocumentIdContext {
    /// Create an empty context
    pub fn new(version: GmlVersion) -> Self {
        Self {
            version,
            objects: IndexMap::new(),
            released: HashMap::new(),
            references: Vec::new(),
            strict_ids: false,
            matcher: None,
            resolver: None,
            exported: HashSet::new(),
            limits: Limits::default(),
            system_id: None,
        }
    }

    /// Reject ids bound to two different objects
    pub fn with_strict_ids(mut self, strict: bool) -> Self {
        self.strict_ids = strict;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Base for relative remote references
    pub fn with_system_id(mut self, system_id: Option<String>) -> Self {
        self.system_id = system_id;
        self
    }

    /// GML version of the session
    pub fn version(&self) -> GmlVersion {
        self.version
    }

    /// Install the predicate selecting remote references to dereference
    pub fn set_reference_pattern_matcher(&mut self, matcher: ReferencePatternMatcher) {
        self.matcher = Some(matcher);
    }

    /// Install the remote reference resolver
    pub fn set_resolver(&mut self, resolver: Rc<dyn ReferenceResolver>) {
        self.resolver = Some(resolver);
    }

    /// Record an object under its own id; objects without id are ignored
    pub fn register_object(&mut self, object: GmlObject) -> Result<()> {
        match object.id().map(str::to_string) {
            Some(id) => self.register(&id, object),
            None => Ok(()),
        }
    }

    /// Record an object under `id`.
    ///
    /// Registering the same object twice is a no-op. Another object under a
    /// known id is an error with strict ids, otherwise the first one wins.
    pub fn register(&mut self, id: &str, object: GmlObject) -> Result<()> {
        if let Some(existing) = self.objects.get(id) {
            if existing.same_object(&object) {
                return Ok(());
            }
            if self.strict_ids {
                return Err(Error::DuplicateIdentifier { id: id.to_string() });
            }
            warn!(id, "duplicate object id, keeping the first object");
            return Ok(());
        }
        self.objects.insert(id.to_string(), object);
        Ok(())
    }

    /// Object registered under `id`
    pub fn get_object(&self, id: &str) -> Option<&GmlObject> {
        self.objects.get(id)
    }

    /// Bound object or a pending marker for `id`
    pub fn resolve_reference(&self, id: &str) -> Resolution {
        match self.lookup(id) {
            Some(object) => Resolution::Resolved(object),
            None => Resolution::Pending(id.to_string()),
        }
    }

    // registered object, or a released one the caller still holds
    fn lookup(&self, id: &str) -> Option<GmlObject> {
        match self.objects.get(id) {
            Some(object) => Some(object.clone()),
            None => self.released.get(id).and_then(ReleasedObject::upgrade),
        }
    }

    /// Whether an object with `id` was defined in this session, even if it
    /// has been released since
    pub fn is_defined(&self, id: &str) -> bool {
        self.objects.contains_key(id) || self.released.contains_key(id)
    }

    /// Create a reference for an `xlink:href` value.
    ///
    /// Same-document references to known ids come back resolved.
    pub fn create_reference(&mut self, href: &str, expected: ObjectCategory) -> Result<GmlReference> {
        let parsed = Href::parse(href)?;
        let reference = GmlReference::new(href.trim(), parsed, expected);

        if let Href::Local { id } = reference.href() {
            if let Some(object) = self.lookup(id) {
                if expected.accepts(object.category()) {
                    reference.resolve(object)?;
                    return Ok(reference);
                }
            }
        }

        self.limits.check_references(self.references.len() + 1)?;
        self.references.push(reference.clone());
        Ok(reference)
    }

    /// Bind pending references.
    ///
    /// Returns the hrefs that could not be bound. Remote references are only
    /// dereferenced when a matcher accepts them and a resolver is installed;
    /// others stay unresolved without being reported. Local references to
    /// released objects are not dangling either: their target was defined.
    pub fn resolve_references(&mut self) -> Vec<String> {
        let mut dangling: Vec<String> = Vec::new();
        let mut settled: Vec<GmlReference> = Vec::new();
        let pending: Vec<GmlReference> = self
            .references
            .iter()
            .filter(|r| !r.is_resolved())
            .cloned()
            .collect();

        for reference in pending {
            let bound = match reference.href().clone() {
                Href::Local { id } => match self.bind_local(&reference, &id) {
                    Some(bound) => bound,
                    None => {
                        debug!(href = reference.uri(), "reference to a released object");
                        settled.push(reference);
                        continue;
                    }
                },
                Href::Remote { .. } => match self.bind_remote(&reference) {
                    Some(bound) => bound,
                    None => continue,
                },
            };
            if !bound && !dangling.iter().any(|d| d == reference.uri()) {
                warn!(href = reference.uri(), "unresolved reference");
                dangling.push(reference.uri().to_string());
            }
        }

        self.references
            .retain(|r| !r.is_resolved() && !settled.iter().any(|s| s.same_reference(r)));
        dangling
    }

    // None: the target was defined but has been released
    fn bind_local(&self, reference: &GmlReference, id: &str) -> Option<bool> {
        match self.lookup(id) {
            Some(object) => match reference.resolve(object) {
                Ok(()) => Some(true),
                Err(err) => {
                    warn!(error = %err, "reference points at an object of the wrong kind");
                    Some(false)
                }
            },
            None if self.released.contains_key(id) => None,
            None => Some(false),
        }
    }

    // None: reference left opaque on purpose
    fn bind_remote(&self, reference: &GmlReference) -> Option<bool> {
        let wanted = self
            .matcher
            .as_ref()
            .map(|m| m.matches(reference.uri()))
            .unwrap_or(false);
        if !wanted {
            return None;
        }
        let Some(resolver) = self.resolver.as_ref() else {
            debug!(href = reference.uri(), "no resolver for remote reference");
            return Some(false);
        };
        match resolver.resolve(reference.uri(), self.system_id.as_deref()) {
            Ok(Some(object)) => Some(reference.resolve(object).is_ok()),
            Ok(None) => Some(false),
            Err(err) => {
                warn!(href = reference.uri(), error = %err, "failed to resolve remote reference");
                Some(false)
            }
        }
    }

    /// Pending references
    pub fn pending_references(&self) -> impl Iterator<Item = &GmlReference> {
        self.references.iter().filter(|r| !r.is_resolved())
    }

    /// Number of registered objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Release objects registered after the first `count`.
    ///
    /// Their ids stay known: references to them bind while the caller still
    /// holds the object and are never reported as dangling.
    pub fn truncate_objects(&mut self, count: usize) {
        while self.objects.len() > count {
            if let Some((id, object)) = self.objects.pop() {
                self.released.insert(id, ReleasedObject::new(&object));
            }
        }
    }

    /// Whether the object with `id` was already written in this session
    pub fn is_object_exported(&self, id: &str) -> bool {
        self.exported.contains(id)
    }

    /// Record that the object with `id` has been written
    pub fn mark_exported(&mut self, id: &str) {
        self.exported.insert(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn point(id: &str) -> GmlObject {
        let mut p = Point::new(vec![1.0, 2.0], None);
        p.id = Some(id.to_string());
        GmlObject::Geometry(Rc::new(Geometry::Point(p)))
    }

    #[test]
    fn test_register_same_object_twice() {
        let mut ctx = DocumentIdContext::new(GmlVersion::Gml32).with_strict_ids(true);
        let p = point("P1");
        ctx.register_object(p.clone()).unwrap();
        ctx.register_object(p).unwrap();
        assert_eq!(ctx.object_count(), 1);
    }

    #[test]
    fn test_duplicate_ids() {
        let mut strict = DocumentIdContext::new(GmlVersion::Gml32).with_strict_ids(true);
        strict.register_object(point("P1")).unwrap();
        assert!(matches!(
            strict.register_object(point("P1")),
            Err(Error::DuplicateIdentifier { .. })
        ));

        let mut lax = DocumentIdContext::new(GmlVersion::Gml32);
        let first = point("P1");
        lax.register_object(first.clone()).unwrap();
        lax.register_object(point("P1")).unwrap();
        assert!(lax.get_object("P1").unwrap().same_object(&first));
    }

    #[test]
    fn test_backward_reference_resolves_immediately() {
        let mut ctx = DocumentIdContext::new(GmlVersion::Gml31);
        ctx.register_object(point("P1")).unwrap();
        let reference = ctx.create_reference("#P1", ObjectCategory::Geometry).unwrap();
        assert!(reference.is_resolved());
        assert!(ctx.resolve_references().is_empty());
    }

    #[test]
    fn test_forward_and_dangling_references() {
        let mut ctx = DocumentIdContext::new(GmlVersion::Gml31);
        let forward = ctx.create_reference("#P2", ObjectCategory::Geometry).unwrap();
        let copy = forward.clone();
        let dangling = ctx.create_reference("#missing", ObjectCategory::Any).unwrap();
        assert!(matches!(ctx.resolve_reference("P2"), Resolution::Pending(_)));

        ctx.register_object(point("P2")).unwrap();
        let report = ctx.resolve_references();

        assert_eq!(report, vec!["#missing".to_string()]);
        assert!(copy.is_resolved());
        assert!(copy.same_reference(&forward));
        assert!(!dangling.is_resolved());
    }

    #[test]
    fn test_released_objects_are_not_dangling() {
        let mut ctx = DocumentIdContext::new(GmlVersion::Gml32);
        let held = point("P1");
        ctx.register_object(held.clone()).unwrap();
        ctx.register_object(point("P2")).unwrap();
        ctx.truncate_objects(0);
        assert_eq!(ctx.object_count(), 0);
        assert!(ctx.is_defined("P1") && ctx.is_defined("P2"));

        let to_held = ctx.create_reference("#P1", ObjectCategory::Geometry).unwrap();
        assert!(to_held.object().unwrap().same_object(&held));

        let to_dropped = ctx.create_reference("#P2", ObjectCategory::Geometry).unwrap();
        ctx.create_reference("#P3", ObjectCategory::Any).unwrap();
        assert_eq!(ctx.resolve_references(), vec!["#P3".to_string()]);
        assert!(!to_dropped.is_resolved());
        assert_eq!(ctx.pending_references().count(), 1);
    }

    #[test]
    fn test_category_mismatch_is_dangling() {
        let mut ctx = DocumentIdContext::new(GmlVersion::Gml32);
        ctx.create_reference("#P1", ObjectCategory::Feature).unwrap();
        ctx.register_object(point("P1")).unwrap();
        assert_eq!(ctx.resolve_references(), vec!["#P1".to_string()]);
    }

    #[derive(Debug)]
    struct FixedResolver;

    impl ReferenceResolver for FixedResolver {
        fn resolve(&self, uri: &str, _base: Option<&str>) -> Result<Option<GmlObject>> {
            Ok(if uri.starts_with("http://example.com/") {
                Some(point("REMOTE"))
            } else {
                None
            })
        }
    }

    #[test]
    fn test_remote_references() {
        let mut ctx = DocumentIdContext::new(GmlVersion::Gml32);
        ctx.set_reference_pattern_matcher(
            ReferencePatternMatcher::new(&["^http://example\\.com/", "^http://other\\.org/"]).unwrap(),
        );
        ctx.set_resolver(Rc::new(FixedResolver));

        let fetched = ctx
            .create_reference("http://example.com/doc.gml#REMOTE", ObjectCategory::Geometry)
            .unwrap();
        let opaque = ctx
            .create_reference("http://elsewhere.net/doc.gml#X", ObjectCategory::Any)
            .unwrap();
        ctx.create_reference("http://other.org/doc.gml#Y", ObjectCategory::Any)
            .unwrap();

        let report = ctx.resolve_references();
        assert!(fetched.is_resolved());
        assert!(!opaque.is_resolved());
        assert_eq!(report, vec!["http://other.org/doc.gml#Y".to_string()]);
    }

    #[test]
    fn test_exported_tracking() {
        let mut ctx = DocumentIdContext::new(GmlVersion::Gml2);
        assert!(!ctx.is_object_exported("F1"));
        ctx.mark_exported("F1");
        assert!(ctx.is_object_exported("F1"));
    }
}
