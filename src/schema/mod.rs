//! Application schema model
//!
//! An [`ApplicationSchema`] tells the feature reader which elements are
//! features, which of them are collections and what each property holds.
//! It is either built in code or decoded from an XSD document with
//! [`decode_app_schema`].

pub mod xsd;

pub use xsd::decode_app_schema;

use crate::geometry::GeometryKind;
use crate::namespaces::{QName, GML_32_NS, GML_PRE_32_NS};
use crate::version::GmlVersion;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurs {
    /// Minimum number of occurrences
    pub min: u32,
    /// Maximum number of occurrences
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// (1, 1)
    pub fn once() -> Self {
        Self::new(1, Some(1))
    }

    /// (0, 1)
    pub fn optional() -> Self {
        Self::new(0, Some(1))
    }

    /// (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self::new(0, None)
    }

    /// Check if particle can have multiple occurrences
    pub fn is_multiple(&self) -> bool {
        self.max.map(|max| max > 1).unwrap_or(true)
    }

    /// Check if occurrence count is under the minimum
    pub fn is_missing(&self, count: u32) -> bool {
        count < self.min
    }

    /// Check if occurrence count exceeds the maximum
    pub fn is_exceeded(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count > max,
            None => false,
        }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

/// XSD simple types the reader checks values against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// Anything
    String,
    /// `true`, `false`, `1`, `0`
    Boolean,
    /// Integral number
    Integer,
    /// Decimal number
    Decimal,
    /// Floating point number
    Double,
    /// `xs:date`, not checked
    Date,
    /// `xs:dateTime`, not checked
    DateTime,
    /// `xs:anyURI`, not checked
    AnyUri,
}

impl PrimitiveType {
    /// Map an XSD built-in type name; unknown names are strings
    pub fn from_xsd(local_name: &str) -> Self {
        match local_name {
            "boolean" => PrimitiveType::Boolean,
            "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger" | "positiveInteger"
            | "negativeInteger" | "nonPositiveInteger" | "unsignedInt" | "unsignedLong"
            | "unsignedShort" | "unsignedByte" => PrimitiveType::Integer,
            "decimal" => PrimitiveType::Decimal,
            "double" | "float" => PrimitiveType::Double,
            "date" => PrimitiveType::Date,
            "dateTime" => PrimitiveType::DateTime,
            "anyURI" => PrimitiveType::AnyUri,
            _ => PrimitiveType::String,
        }
    }

    /// Check a lexical value; the error names the problem
    pub fn check(&self, text: &str) -> std::result::Result<(), String> {
        let value = text.trim();
        let ok = match self {
            PrimitiveType::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            PrimitiveType::Integer => value.parse::<i128>().is_ok(),
            PrimitiveType::Decimal => {
                !value.is_empty()
                    && !value.contains(|c: char| c == 'e' || c == 'E')
                    && value.parse::<f64>().map(f64::is_finite).unwrap_or(false)
            }
            PrimitiveType::Double => {
                matches!(value, "INF" | "-INF" | "NaN") || value.parse::<f64>().is_ok()
            }
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("Value '{}' is not a valid {:?}.", value, self))
        }
    }
}

/// What a property holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Text of the given type
    Simple(PrimitiveType),
    /// Geometry of the given shape
    Geometry(GeometryKind),
    /// `gml:Envelope` / `gml:Box`
    Envelope,
    /// Feature, optionally restricted to one feature element
    Feature {
        /// Expected feature element
        value_type: Option<QName>,
    },
    /// Member of a feature collection (`gml:AbstractFeatureMemberType`)
    FeatureMember,
    /// `gml:CodeType`
    Code,
    /// `gml:MeasureType`
    Measure,
}

/// Declared property of a feature type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    /// Element name
    pub name: QName,
    /// Content
    pub kind: PropertyKind,
    /// Cardinality
    pub occurs: Occurs,
    /// Named XSD type of the property element, if any
    pub type_name: Option<QName>,
    /// `nillable="true"`
    pub nillable: bool,
}

impl PropertyDecl {
    /// Declaration occurring exactly once
    pub fn new(name: QName, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            occurs: Occurs::once(),
            type_name: None,
            nillable: false,
        }
    }

    /// Set the cardinality
    pub fn with_occurs(mut self, occurs: Occurs) -> Self {
        self.occurs = occurs;
        self
    }

    /// Set the XSD type name
    pub fn with_type_name(mut self, type_name: QName) -> Self {
        self.type_name = Some(type_name);
        self
    }

    /// Allow `xsi:nil`
    pub fn with_nillable(mut self, nillable: bool) -> Self {
        self.nillable = nillable;
        self
    }
}

/// Compositor of a model group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compositor {
    /// `xs:sequence`
    Sequence,
    /// `xs:choice`
    Choice,
    /// `xs:all`
    All,
}

/// `xs:sequence`, `xs:choice` or `xs:all`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelGroup {
    /// Compositor
    pub compositor: Compositor,
    /// Children in order
    pub particles: Vec<Particle>,
}

/// Term of a particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Element declaration
    Element(PropertyDecl),
    /// Nested model group
    Group(ModelGroup),
    /// `xs:any`
    Wildcard,
}

/// Term with its occurrence bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// The term
    pub term: Term,
    /// Occurrence bounds
    pub occurs: Occurs,
}

impl ModelGroup {
    /// Sequence of the given declarations
    pub fn sequence(properties: &[PropertyDecl]) -> Self {
        Self {
            compositor: Compositor::Sequence,
            particles: properties
                .iter()
                .map(|p| Particle {
                    occurs: p.occurs,
                    term: Term::Element(p.clone()),
                })
                .collect(),
        }
    }

    /// All element declarations, depth first
    pub fn element_decls(&self) -> Vec<&PropertyDecl> {
        let mut decls = Vec::new();
        collect_decls(self, &mut decls);
        decls
    }

    /// Whether any element particle, searched depth first, satisfies `f`.
    ///
    /// Stops at the first match. `f` gets the declaration and the effective
    /// maximum occurrence (the element's own times those of enclosing groups).
    pub fn any_element<F>(&self, f: &mut F) -> bool
    where
        F: FnMut(&PropertyDecl, Option<u32>) -> bool,
    {
        any_particle(&self.particles, Some(1), f)
    }
}

fn collect_decls<'g>(group: &'g ModelGroup, decls: &mut Vec<&'g PropertyDecl>) {
    for particle in &group.particles {
        match &particle.term {
            Term::Element(decl) => decls.push(decl),
            Term::Group(nested) => collect_decls(nested, decls),
            Term::Wildcard => {}
        }
    }
}

fn multiply(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.saturating_mul(b)),
        _ => None,
    }
}

fn any_particle<F>(particles: &[Particle], outer_max: Option<u32>, f: &mut F) -> bool
where
    F: FnMut(&PropertyDecl, Option<u32>) -> bool,
{
    particles.iter().any(|particle| {
        let max = multiply(outer_max, particle.occurs.max);
        match &particle.term {
            Term::Element(decl) => f(decl, max),
            Term::Group(group) => any_particle(&group.particles, max, f),
            Term::Wildcard => false,
        }
    })
}

/// Named complex type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Type name
    pub name: QName,
    /// Base type of the extension or restriction
    pub base: Option<QName>,
}

/// Feature type of an application schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureType {
    /// Feature element name
    pub name: QName,
    /// Properties in declaration order, inherited ones first
    pub properties: Vec<PropertyDecl>,
    /// Head of the element's substitution group
    pub substitution_group: Option<QName>,
    /// Content model, if known
    pub content: Option<ModelGroup>,
    /// `abstract="true"`
    pub is_abstract: bool,
    collection: Option<bool>,
}

impl FeatureType {
    /// Concrete feature type without properties
    pub fn new(name: QName) -> Self {
        Self {
            name,
            properties: Vec::new(),
            substitution_group: None,
            content: None,
            is_abstract: false,
            collection: None,
        }
    }

    /// Add a property
    pub fn with_property(mut self, property: PropertyDecl) -> Self {
        self.properties.push(property);
        self
    }

    /// Set the substitution group head
    pub fn with_substitution_group(mut self, head: QName) -> Self {
        self.substitution_group = Some(head);
        self
    }

    /// Set the content model
    pub fn with_content(mut self, content: ModelGroup) -> Self {
        self.content = Some(content);
        self
    }

    /// Mark as abstract
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Force the collection classification
    pub fn with_collection(mut self, collection: bool) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Explicit collection classification, if one was set
    pub fn collection_override(&self) -> Option<bool> {
        self.collection
    }

    /// Declared property
    pub fn property(&self, name: &QName) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| &p.name == name)
    }
}

/// Feature types, named types and substitution groups of one schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationSchema {
    feature_types: IndexMap<QName, FeatureType>,
    types: IndexMap<QName, TypeDefinition>,
}

impl ApplicationSchema {
    /// Empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a feature type
    pub fn add_feature_type(&mut self, feature_type: FeatureType) {
        self.feature_types.insert(feature_type.name.clone(), feature_type);
    }

    /// Builder variant of [`add_feature_type`](Self::add_feature_type)
    pub fn with_feature_type(mut self, feature_type: FeatureType) -> Self {
        self.add_feature_type(feature_type);
        self
    }

    /// Add or replace a named type
    pub fn add_type(&mut self, definition: TypeDefinition) {
        self.types.insert(definition.name.clone(), definition);
    }

    /// Feature type for an element name; abstract types are included
    pub fn feature_type(&self, name: &QName) -> Option<&FeatureType> {
        self.feature_types.get(name)
    }

    /// All feature types in declaration order
    pub fn feature_types(&self) -> impl Iterator<Item = &FeatureType> {
        self.feature_types.values()
    }

    /// Named type definition
    pub fn type_definition(&self, name: &QName) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Whether type `name` is `base` or derives from it
    pub fn is_derived_from(&self, name: &QName, base: &QName) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(name);
        while let Some(type_name) = current {
            if type_name == base {
                return true;
            }
            if !seen.insert(type_name) {
                return false;
            }
            current = self.types.get(type_name).and_then(|t| t.base.as_ref());
        }
        false
    }

    /// Whether element `name` is `head` or in its substitution group, transitively
    pub fn substitutes_for(&self, name: &QName, head: &QName) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(name);
        while let Some(element) = current {
            if element == head {
                return true;
            }
            if !seen.insert(element) {
                return false;
            }
            current = self
                .feature_types
                .get(element)
                .and_then(|ft| ft.substitution_group.as_ref());
        }
        false
    }

    /// Whether `feature_type` is a feature collection under `version`.
    ///
    /// Before GML 3.2 a collection substitutes for `gml:_FeatureCollection`
    /// (or `gml:FeatureCollection`). For GML 3.2 a collection has a property
    /// whose type derives from `gml:AbstractFeatureMemberType`, or the
    /// deprecated form: a `gml:FeaturePropertyType` property allowed more than
    /// once.
    pub fn is_feature_collection(&self, feature_type: &FeatureType, version: GmlVersion) -> bool {
        if let Some(collection) = feature_type.collection {
            return collection;
        }
        if version.is_pre_32() {
            let heads = [
                QName::namespaced(GML_PRE_32_NS, "_FeatureCollection"),
                QName::namespaced(GML_PRE_32_NS, "FeatureCollection"),
            ];
            return heads
                .iter()
                .any(|head| feature_type.name != *head && self.substitutes_for(&feature_type.name, head));
        }

        let member_type = QName::namespaced(GML_32_NS, "AbstractFeatureMemberType");
        let property_type = QName::namespaced(GML_32_NS, "FeaturePropertyType");
        let mut is_member = |decl: &PropertyDecl, max: Option<u32>| {
            if decl.kind == PropertyKind::FeatureMember {
                return true;
            }
            if let Some(type_name) = &decl.type_name {
                if self.is_derived_from(type_name, &member_type) {
                    return true;
                }
                if self.is_derived_from(type_name, &property_type) && max.map(|m| m > 1).unwrap_or(true) {
                    return true;
                }
            }
            false
        };
        match &feature_type.content {
            Some(content) => content.any_element(&mut is_member),
            None => ModelGroup::sequence(&feature_type.properties).any_element(&mut is_member),
        }
    }

    /// Whether `name` is a collection element under `version`
    pub fn is_feature_collection_element(&self, name: &QName, version: GmlVersion) -> bool {
        self.feature_type(name)
            .map(|ft| self.is_feature_collection(ft, version))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(local: &str) -> QName {
        QName::namespaced("urn:app", local)
    }

    fn gml32(local: &str) -> QName {
        QName::namespaced(GML_32_NS, local)
    }

    fn schema_32() -> ApplicationSchema {
        let mut schema = ApplicationSchema::new();
        schema.add_type(TypeDefinition {
            name: gml32("AbstractFeatureMemberType"),
            base: None,
        });
        schema.add_type(TypeDefinition {
            name: gml32("FeaturePropertyType"),
            base: None,
        });
        schema.add_type(TypeDefinition {
            name: app("RoadMemberType"),
            base: Some(gml32("AbstractFeatureMemberType")),
        });
        schema
    }

    #[test]
    fn test_occurs() {
        assert!(Occurs::zero_or_more().is_multiple());
        assert!(!Occurs::once().is_multiple());
        assert!(Occurs::once().is_exceeded(2));
        assert!(Occurs::once().is_missing(0));
        assert!(!Occurs::optional().is_missing(0));
    }

    #[test]
    fn test_primitive_check() {
        assert!(PrimitiveType::Integer.check("42").is_ok());
        assert!(PrimitiveType::Integer.check("4.2").is_err());
        assert!(PrimitiveType::Boolean.check("true").is_ok());
        assert!(PrimitiveType::Boolean.check("yes").is_err());
        assert!(PrimitiveType::Decimal.check("1.5").is_ok());
        assert!(PrimitiveType::Decimal.check("1e5").is_err());
        assert!(PrimitiveType::Double.check("1e5").is_ok());
        assert!(PrimitiveType::String.check("anything").is_ok());
    }

    #[test]
    fn test_collection_32_via_nested_group() {
        let member = PropertyDecl::new(app("road"), PropertyKind::Feature { value_type: None })
            .with_type_name(app("RoadMemberType"));
        let content = ModelGroup {
            compositor: Compositor::Sequence,
            particles: vec![Particle {
                occurs: Occurs::once(),
                term: Term::Group(ModelGroup {
                    compositor: Compositor::Choice,
                    particles: vec![Particle {
                        occurs: Occurs::once(),
                        term: Term::Element(member.clone()),
                    }],
                }),
            }],
        };
        let collection = FeatureType::new(app("Roads"))
            .with_property(member)
            .with_content(content);
        let schema = schema_32().with_feature_type(collection.clone());
        assert!(schema.is_feature_collection(&collection, GmlVersion::Gml32));
    }

    #[test]
    fn test_feature_property_needs_multiple_occurs() {
        let single = PropertyDecl::new(app("owner"), PropertyKind::Feature { value_type: None })
            .with_type_name(gml32("FeaturePropertyType"));
        let feature = FeatureType::new(app("Parcel")).with_property(single.clone());
        let schema = schema_32();
        assert!(!schema.is_feature_collection(&feature, GmlVersion::Gml32));

        let many = FeatureType::new(app("Parcels"))
            .with_property(single.with_occurs(Occurs::zero_or_more()));
        assert!(schema.is_feature_collection(&many, GmlVersion::Gml32));
        assert!(!schema.is_feature_collection(&many.clone().with_collection(false), GmlVersion::Gml32));
    }

    #[test]
    fn test_collection_pre_32_substitution_group() {
        let head = QName::namespaced(GML_PRE_32_NS, "_FeatureCollection");
        let mut schema = ApplicationSchema::new();
        schema.add_feature_type(
            FeatureType::new(app("AbstractRoads"))
                .with_substitution_group(head)
                .with_abstract(true),
        );
        schema.add_feature_type(
            FeatureType::new(app("Roads")).with_substitution_group(app("AbstractRoads")),
        );
        schema.add_feature_type(FeatureType::new(app("Road")));

        assert!(schema.is_feature_collection_element(&app("Roads"), GmlVersion::Gml31));
        assert!(!schema.is_feature_collection_element(&app("Road"), GmlVersion::Gml31));
        assert!(!schema.is_feature_collection_element(&app("Roads"), GmlVersion::Gml32));
    }
}
