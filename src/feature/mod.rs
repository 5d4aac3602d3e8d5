//! Feature object model and the feature codec
//!
//! Features are read into a generic model: an element name, an optional id
//! and the properties in document order. The model does not know about
//! feature types; the [`ApplicationSchema`](crate::schema::ApplicationSchema)
//! only steers how [`FeatureReader`] interprets property content.

pub mod reader;
pub mod stream;
pub mod writer;

pub use reader::FeatureReader;
pub use stream::FeatureStream;
pub use writer::{FeatureWriter, FeatureWriterOptions};

use crate::geometry::{Envelope, Geometry};
use crate::namespaces::QName;
use crate::reference::GmlReference;
use std::rc::Rc;

/// Content of a property element
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// No content
    Empty,
    /// Text content
    Text(String),
    /// `gml:CodeType` value
    Code {
        /// The code
        code: String,
        /// `codeSpace` attribute
        code_space: Option<String>,
    },
    /// `gml:MeasureType` value
    Measure {
        /// Numeric value
        value: f64,
        /// `uom` attribute
        uom: Option<String>,
    },
    /// Inline geometry, or a geometry reference placeholder
    Geometry(Rc<Geometry>),
    /// `gml:Envelope` / `gml:Box`
    Envelope(Envelope),
    /// Inline feature
    Feature(Rc<Feature>),
    /// `xlink:href` to a feature or any other object
    Reference(GmlReference),
}

impl PropertyValue {
    /// Text of simple values
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            PropertyValue::Code { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Inline geometry, or the target of a resolved geometry reference
    pub fn as_geometry(&self) -> Option<Rc<Geometry>> {
        match self {
            PropertyValue::Geometry(geometry) => match geometry.as_ref() {
                Geometry::Reference(r) => r.resolved().or_else(|| Some(Rc::clone(geometry))),
                _ => Some(Rc::clone(geometry)),
            },
            PropertyValue::Reference(r) => r.geometry(),
            _ => None,
        }
    }

    /// Inline feature, or the target of a resolved feature reference
    pub fn as_feature(&self) -> Option<Rc<Feature>> {
        match self {
            PropertyValue::Feature(feature) => Some(Rc::clone(feature)),
            PropertyValue::Reference(r) => r.feature(),
            _ => None,
        }
    }

    /// The reference, for `xlink:href` values
    pub fn as_reference(&self) -> Option<&GmlReference> {
        match self {
            PropertyValue::Reference(r) => Some(r),
            PropertyValue::Geometry(geometry) => match geometry.as_ref() {
                Geometry::Reference(r) => Some(&r.reference),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Property of a feature
#[derive(Debug, Clone)]
pub struct Property {
    /// Property element name
    pub name: QName,
    /// Content
    pub value: PropertyValue,
    /// `xsi:nil="true"`
    pub nil: bool,
}

impl Property {
    /// Property with a value
    pub fn new(name: QName, value: PropertyValue) -> Self {
        Self { name, value, nil: false }
    }

    /// Nilled property
    pub fn nil(name: QName) -> Self {
        Self {
            name,
            value: PropertyValue::Empty,
            nil: true,
        }
    }

    /// Text property
    pub fn text(name: QName, text: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::Text(text.into()))
    }

    /// Geometry property
    pub fn geometry(name: QName, geometry: Geometry) -> Self {
        Self::new(name, PropertyValue::Geometry(Rc::new(geometry)))
    }

    /// Feature-valued property
    pub fn feature(name: QName, feature: Rc<Feature>) -> Self {
        Self::new(name, PropertyValue::Feature(feature))
    }
}

/// A feature
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature element name
    pub name: QName,
    /// `gml:id` (`fid` for GML 2)
    pub id: Option<String>,
    /// Properties in document order
    pub properties: Vec<Property>,
    /// Properties outside the feature type, written only on request
    pub extra_properties: Vec<Property>,
}

impl Feature {
    /// Feature without id or properties
    pub fn new(name: QName) -> Self {
        Self {
            name,
            id: None,
            properties: Vec::new(),
            extra_properties: Vec::new(),
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a property
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Append an extra property
    pub fn with_extra_property(mut self, property: Property) -> Self {
        self.extra_properties.push(property);
        self
    }

    /// First property with the given name
    pub fn property(&self, name: &QName) -> Option<&Property> {
        self.properties.iter().find(|p| &p.name == name)
    }

    /// All properties with the given name
    pub fn properties_named<'f>(&'f self, name: &'f QName) -> impl Iterator<Item = &'f Property> + 'f {
        self.properties.iter().filter(move |p| &p.name == name)
    }

    /// Geometry-valued properties
    pub fn geometries(&self) -> impl Iterator<Item = Rc<Geometry>> + '_ {
        self.properties.iter().filter_map(|p| p.value.as_geometry())
    }

    /// The `gml:boundedBy` envelope, if the feature carries one
    pub fn bounded_by(&self) -> Option<&Envelope> {
        self.properties.iter().find_map(|p| match &p.value {
            PropertyValue::Envelope(e) if p.name.local_name == "boundedBy" => Some(e),
            _ => None,
        })
    }

    /// Bounding box of all geometry properties
    pub fn envelope(&self) -> Option<Envelope> {
        self.geometries()
            .filter_map(|g| g.envelope())
            .reduce(|a, b| a.merge(&b))
    }
}

/// Member of a feature collection
#[derive(Debug, Clone)]
pub enum FeatureMember {
    /// Inline member
    Inline(Rc<Feature>),
    /// `xlink:href` member
    Reference(GmlReference),
}

impl FeatureMember {
    /// The member feature, once available
    pub fn feature(&self) -> Option<Rc<Feature>> {
        match self {
            FeatureMember::Inline(feature) => Some(Rc::clone(feature)),
            FeatureMember::Reference(r) => r.feature(),
        }
    }

    /// Id of the member, inline or referenced
    pub fn id(&self) -> Option<&str> {
        match self {
            FeatureMember::Inline(feature) => feature.id.as_deref(),
            FeatureMember::Reference(r) => r.id(),
        }
    }
}

/// A feature collection
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    /// Collection element name
    pub name: QName,
    /// `gml:id` (`fid` for GML 2)
    pub id: Option<String>,
    /// `gml:boundedBy` envelope
    pub bounded_by: Option<Envelope>,
    /// Non-member properties
    pub properties: Vec<Property>,
    /// Members in document order
    pub members: Vec<FeatureMember>,
}

impl FeatureCollection {
    /// Empty collection
    pub fn new(name: QName) -> Self {
        Self {
            name,
            id: None,
            bounded_by: None,
            properties: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append an inline member
    pub fn with_member(mut self, feature: Rc<Feature>) -> Self {
        self.members.push(FeatureMember::Inline(feature));
        self
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True without members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member features that are inline or resolved
    pub fn features(&self) -> impl Iterator<Item = Rc<Feature>> + '_ {
        self.members.iter().filter_map(FeatureMember::feature)
    }

    /// Bounding box of all available members
    pub fn envelope(&self) -> Option<Envelope> {
        self.features()
            .filter_map(|f| f.envelope())
            .reduce(|a, b| a.merge(&b))
    }
}
