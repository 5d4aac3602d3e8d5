//! Decoding of GML application schemas
//!
//! Reads one XSD document: global elements that substitute (transitively)
//! for a GML feature head become feature types, their complex types become
//! content models and GML property types are mapped onto [`PropertyKind`].
//! Imports and includes are not followed; types from other namespaces are
//! only known by name.

use super::{
    ApplicationSchema, Compositor, FeatureType, ModelGroup, Occurs, Particle, PrimitiveType, PropertyDecl,
    PropertyKind, Term, TypeDefinition,
};
use crate::documents::{Document, Element};
use crate::error::{Error, Result};
use crate::geometry::GeometryKind;
use crate::namespaces::{QName, GML_32_NS, GML_PRE_32_NS, XSD_NS};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::debug;

const FEATURE_HEADS: &[&str] = &[
    "_Feature",
    "AbstractFeature",
    "_FeatureCollection",
    "AbstractFeatureCollection",
    "FeatureCollection",
];

/// Build an application schema from the text of an XSD document
pub fn decode_app_schema(xsd: &str) -> Result<ApplicationSchema> {
    let document = Document::from_string(xsd)?;
    decode_document(&document)
}

/// Build an application schema from a parsed XSD document
pub fn decode_document(document: &Document) -> Result<ApplicationSchema> {
    let root = document.root();
    if !root.is(XSD_NS, "schema") {
        return Err(Error::Other(format!(
            "Expected an 'xs:schema' root element, found '{}'",
            root.name
        )));
    }
    let decoder = Decoder::new(root);
    decoder.decode()
}

fn is_gml(name: &QName) -> bool {
    name.in_namespace(GML_PRE_32_NS) || name.in_namespace(GML_32_NS)
}

/// Property kind for a type from the GML namespace
fn gml_type_kind(local_name: &str) -> Option<PropertyKind> {
    let geometry = |kind| Some(PropertyKind::Geometry(kind));
    match local_name {
        "PointPropertyType" => geometry(GeometryKind::Point),
        "LineStringPropertyType" => geometry(GeometryKind::LineString),
        "LinearRingPropertyType" => geometry(GeometryKind::LinearRing),
        "CurvePropertyType" => geometry(GeometryKind::Curve),
        "PolygonPropertyType" => geometry(GeometryKind::Polygon),
        "SurfacePropertyType" => geometry(GeometryKind::Surface),
        "MultiPointPropertyType" => geometry(GeometryKind::MultiPoint),
        "MultiLineStringPropertyType" => geometry(GeometryKind::MultiLineString),
        "MultiCurvePropertyType" => geometry(GeometryKind::MultiCurve),
        "MultiPolygonPropertyType" => geometry(GeometryKind::MultiPolygon),
        "MultiSurfacePropertyType" => geometry(GeometryKind::MultiSurface),
        "MultiGeometryPropertyType" => geometry(GeometryKind::MultiGeometry),
        "GeometryPropertyType" | "GeometryAssociationType" => geometry(GeometryKind::Any),
        "BoundingShapeType" | "EnvelopePropertyType" => Some(PropertyKind::Envelope),
        "FeaturePropertyType" | "FeatureAssociationType" => Some(PropertyKind::Feature { value_type: None }),
        "AbstractFeatureMemberType" | "FeatureArrayPropertyType" => Some(PropertyKind::FeatureMember),
        "CodeType" | "CodeWithAuthorityType" | "CodeOrNilReasonType" => Some(PropertyKind::Code),
        "MeasureType" | "LengthType" | "AngleType" | "AreaType" | "VolumeType" | "SpeedType"
        | "ScaleType" | "GridLengthType" | "TimeType" => Some(PropertyKind::Measure),
        _ => None,
    }
}

/// Geometry kind for a GML geometry element
fn gml_geometry_element(local_name: &str) -> Option<GeometryKind> {
    Some(match local_name {
        "Point" => GeometryKind::Point,
        "LineString" => GeometryKind::LineString,
        "LinearRing" => GeometryKind::LinearRing,
        "Curve" | "_Curve" | "AbstractCurve" => GeometryKind::Curve,
        "Polygon" => GeometryKind::Polygon,
        "Surface" | "_Surface" | "AbstractSurface" => GeometryKind::Surface,
        "MultiPoint" => GeometryKind::MultiPoint,
        "MultiLineString" => GeometryKind::MultiLineString,
        "MultiCurve" => GeometryKind::MultiCurve,
        "MultiPolygon" => GeometryKind::MultiPolygon,
        "MultiSurface" => GeometryKind::MultiSurface,
        "MultiGeometry" => GeometryKind::MultiGeometry,
        "_Geometry" | "AbstractGeometry" | "_GeometricPrimitive" | "AbstractGeometricPrimitive" => {
            GeometryKind::Any
        }
        _ => return None,
    })
}

fn parse_occurs(element: &Element) -> Result<Occurs> {
    let min = match element.attribute("minOccurs") {
        Some(value) => value.trim().parse::<u32>().map_err(|_| {
            Error::Other(format!("minOccurs value '{}' is not a valid non-negative integer", value))
        })?,
        None => 1,
    };
    let max = match element.attribute("maxOccurs").map(str::trim) {
        Some("unbounded") => None,
        Some(value) => Some(value.parse::<u32>().map_err(|_| {
            Error::Other(format!(
                "maxOccurs value '{}' must be a non-negative integer or 'unbounded'",
                value
            ))
        })?),
        None => Some(1),
    };
    Ok(Occurs::new(min, max))
}

struct Decoder<'d> {
    target: Option<String>,
    qualified: bool,
    elements: IndexMap<QName, &'d Element>,
    complex_types: IndexMap<QName, &'d Element>,
    simple_types: IndexMap<QName, &'d Element>,
    types: ApplicationSchema,
}

impl<'d> Decoder<'d> {
    fn new(root: &'d Element) -> Self {
        let target = root.attribute("targetNamespace").map(str::to_string);
        let qualified = root.attribute("elementFormDefault") != Some("unqualified");
        let name = |el: &Element| el.attribute("name").map(|n| QName::new(target.clone(), n));

        let mut elements = IndexMap::new();
        let mut complex_types = IndexMap::new();
        let mut simple_types = IndexMap::new();
        for child in &root.children {
            let Some(qname) = name(child) else { continue };
            if child.is(XSD_NS, "element") {
                elements.insert(qname, child);
            } else if child.is(XSD_NS, "complexType") {
                complex_types.insert(qname, child);
            } else if child.is(XSD_NS, "simpleType") {
                simple_types.insert(qname, child);
            }
        }

        Self {
            target,
            qualified,
            elements,
            complex_types,
            simple_types,
            types: ApplicationSchema::new(),
        }
    }

    fn decode(mut self) -> Result<ApplicationSchema> {
        for (name, complex_type) in &self.complex_types {
            let base = derivation_base(complex_type)?;
            self.types.add_type(TypeDefinition {
                name: name.clone(),
                base,
            });
        }

        let mut feature_types = Vec::new();
        for (name, element) in &self.elements {
            if !self.is_feature_element(name)? {
                continue;
            }
            feature_types.push(self.feature_type(name, element)?);
        }
        for feature_type in feature_types {
            debug!(name = %feature_type.name, properties = feature_type.properties.len(), "decoded feature type");
            self.types.add_feature_type(feature_type);
        }
        Ok(self.types)
    }

    fn is_feature_element(&self, name: &QName) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut current = name.clone();
        loop {
            if !seen.insert(current.clone()) {
                return Ok(false);
            }
            let Some(element) = self.elements.get(&current) else {
                return Ok(false);
            };
            match element.qname_attribute("substitutionGroup")? {
                Some(head) if is_gml(&head) => return Ok(FEATURE_HEADS.contains(&head.local_name.as_str())),
                Some(head) => current = head,
                None => return Ok(false),
            }
        }
    }

    fn feature_type(&self, name: &QName, element: &Element) -> Result<FeatureType> {
        let mut feature_type = FeatureType::new(name.clone())
            .with_abstract(element.attribute("abstract") == Some("true"));
        if let Some(head) = element.qname_attribute("substitutionGroup")? {
            feature_type = feature_type.with_substitution_group(head);
        }

        let content = match element.qname_attribute("type")? {
            Some(type_name) => match self.complex_types.get(&type_name) {
                Some(complex_type) => Some(self.content_model(complex_type, &mut HashSet::new())?),
                None => None,
            },
            None => match element.child(XSD_NS, "complexType") {
                Some(complex_type) => Some(self.content_model(complex_type, &mut HashSet::new())?),
                None => None,
            },
        };
        if let Some(content) = content {
            feature_type.properties = content.element_decls().into_iter().cloned().collect();
            feature_type = feature_type.with_content(content);
        }
        Ok(feature_type)
    }

    // the complex type's own particles, preceded by those of base types
    // from this schema when it is an extension
    fn content_model(&self, complex_type: &Element, seen: &mut HashSet<QName>) -> Result<ModelGroup> {
        let mut particles = Vec::new();

        let derivation = complex_type
            .child(XSD_NS, "complexContent")
            .and_then(|cc| cc.child(XSD_NS, "extension").or_else(|| cc.child(XSD_NS, "restriction")));
        let body = match derivation {
            Some(derivation) => {
                if derivation.is(XSD_NS, "extension") {
                    if let Some(base) = derivation.qname_attribute("base")? {
                        if let Some(base_type) = self.complex_types.get(&base) {
                            if seen.insert(base.clone()) {
                                let inherited = self.content_model(base_type, seen)?;
                                particles.push(Particle {
                                    term: Term::Group(inherited),
                                    occurs: Occurs::once(),
                                });
                            }
                        }
                    }
                }
                derivation
            }
            None => complex_type,
        };

        for child in &body.children {
            if let Some(group) = self.model_group(child)? {
                particles.push(Particle {
                    occurs: parse_occurs(child)?,
                    term: Term::Group(group),
                });
            }
        }
        Ok(ModelGroup {
            compositor: Compositor::Sequence,
            particles,
        })
    }

    fn model_group(&self, element: &Element) -> Result<Option<ModelGroup>> {
        let compositor = if element.is(XSD_NS, "sequence") {
            Compositor::Sequence
        } else if element.is(XSD_NS, "choice") {
            Compositor::Choice
        } else if element.is(XSD_NS, "all") {
            Compositor::All
        } else {
            return Ok(None);
        };

        let mut particles = Vec::new();
        for child in &element.children {
            let term = if child.is(XSD_NS, "element") {
                Term::Element(self.property_decl(child)?)
            } else if child.is(XSD_NS, "any") {
                Term::Wildcard
            } else if let Some(group) = self.model_group(child)? {
                Term::Group(group)
            } else {
                debug!(element = %child.name, "ignoring schema component in model group");
                continue;
            };
            particles.push(Particle {
                term,
                occurs: parse_occurs(child)?,
            });
        }
        Ok(Some(ModelGroup { compositor, particles }))
    }

    fn property_decl(&self, element: &Element) -> Result<PropertyDecl> {
        let occurs = parse_occurs(element)?;
        let nillable = element.attribute("nillable") == Some("true");

        if let Some(reference) = element.qname_attribute("ref")? {
            let mut decl = match self.elements.get(&reference) {
                Some(global) => self.declared_property(reference.clone(), global)?,
                None => PropertyDecl::new(reference.clone(), PropertyKind::Simple(PrimitiveType::String)),
            };
            decl.occurs = occurs;
            decl.nillable |= nillable;
            return Ok(decl);
        }

        let local = element
            .attribute("name")
            .ok_or_else(|| Error::Other("Local element declaration without name or ref".to_string()))?;
        let name = if self.qualified {
            QName::new(self.target.clone(), local)
        } else {
            QName::local(local)
        };
        let mut decl = self.declared_property(name, element)?;
        decl.occurs = occurs;
        decl.nillable = nillable;
        Ok(decl)
    }

    fn declared_property(&self, name: QName, element: &Element) -> Result<PropertyDecl> {
        if let Some(type_name) = element.qname_attribute("type")? {
            let kind = self.kind_for_type(&type_name, &mut HashSet::new())?;
            return Ok(PropertyDecl::new(name, kind).with_type_name(type_name));
        }
        let kind = if let Some(complex_type) = element.child(XSD_NS, "complexType") {
            self.kind_for_complex_type(complex_type, &mut HashSet::new())?
        } else if let Some(simple_type) = element.child(XSD_NS, "simpleType") {
            PropertyKind::Simple(self.simple_type_base(simple_type, &mut HashSet::new())?)
        } else {
            PropertyKind::Simple(PrimitiveType::String)
        };
        Ok(PropertyDecl::new(name, kind))
    }

    fn kind_for_type(&self, type_name: &QName, seen: &mut HashSet<QName>) -> Result<PropertyKind> {
        if type_name.in_namespace(XSD_NS) {
            return Ok(PropertyKind::Simple(PrimitiveType::from_xsd(&type_name.local_name)));
        }
        if is_gml(type_name) {
            return Ok(gml_type_kind(&type_name.local_name)
                .unwrap_or(PropertyKind::Simple(PrimitiveType::String)));
        }
        if !seen.insert(type_name.clone()) {
            return Ok(PropertyKind::Simple(PrimitiveType::String));
        }
        if let Some(complex_type) = self.complex_types.get(type_name) {
            return self.kind_for_complex_type(complex_type, seen);
        }
        if let Some(simple_type) = self.simple_types.get(type_name) {
            return Ok(PropertyKind::Simple(self.simple_type_base(simple_type, seen)?));
        }
        debug!(type_name = %type_name, "unknown property type, treating as text");
        Ok(PropertyKind::Simple(PrimitiveType::String))
    }

    fn kind_for_complex_type(&self, complex_type: &Element, seen: &mut HashSet<QName>) -> Result<PropertyKind> {
        for content in ["complexContent", "simpleContent"] {
            let Some(content) = complex_type.child(XSD_NS, content) else {
                continue;
            };
            let derivation = content
                .child(XSD_NS, "extension")
                .or_else(|| content.child(XSD_NS, "restriction"));
            if let Some(base) = derivation.map(|d| d.qname_attribute("base")).transpose()?.flatten() {
                let kind = self.kind_for_type(&base, seen)?;
                if kind != PropertyKind::Simple(PrimitiveType::String) || content.is(XSD_NS, "simpleContent") {
                    return Ok(kind);
                }
            }
            if let Some(derivation) = derivation {
                if let Some(kind) = self.kind_from_particles(derivation)? {
                    return Ok(kind);
                }
            }
        }
        Ok(self
            .kind_from_particles(complex_type)?
            .unwrap_or(PropertyKind::Simple(PrimitiveType::String)))
    }

    // property types written out by hand: a sequence referring to a
    // feature or geometry element
    fn kind_from_particles(&self, parent: &Element) -> Result<Option<PropertyKind>> {
        for child in &parent.children {
            if child.is(XSD_NS, "element") {
                let Some(reference) = child.qname_attribute("ref")? else {
                    continue;
                };
                if is_gml(&reference) {
                    if let Some(kind) = gml_geometry_element(&reference.local_name) {
                        return Ok(Some(PropertyKind::Geometry(kind)));
                    }
                    if reference.local_name == "Envelope" {
                        return Ok(Some(PropertyKind::Envelope));
                    }
                    if FEATURE_HEADS.contains(&reference.local_name.as_str()) {
                        return Ok(Some(PropertyKind::Feature { value_type: None }));
                    }
                } else if self.is_feature_element(&reference)? {
                    return Ok(Some(PropertyKind::Feature {
                        value_type: Some(reference),
                    }));
                }
            } else if let Some(kind) = self.kind_from_particles(child)? {
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }

    fn simple_type_base(&self, simple_type: &Element, seen: &mut HashSet<QName>) -> Result<PrimitiveType> {
        let Some(restriction) = simple_type.child(XSD_NS, "restriction") else {
            return Ok(PrimitiveType::String);
        };
        match restriction.qname_attribute("base")? {
            Some(base) => match self.kind_for_type(&base, seen)? {
                PropertyKind::Simple(primitive) => Ok(primitive),
                _ => Ok(PrimitiveType::String),
            },
            None => Ok(PrimitiveType::String),
        }
    }
}

fn derivation_base(complex_type: &Element) -> Result<Option<QName>> {
    for content in ["complexContent", "simpleContent"] {
        if let Some(content) = complex_type.child(XSD_NS, content) {
            let derivation = content
                .child(XSD_NS, "extension")
                .or_else(|| content.child(XSD_NS, "restriction"));
            if let Some(derivation) = derivation {
                return derivation.qname_attribute("base");
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::GmlVersion;

    const ROADS_32: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:gml="http://www.opengis.net/gml/3.2"
           xmlns:app="urn:app" targetNamespace="urn:app" elementFormDefault="qualified">
  <xs:import namespace="http://www.opengis.net/gml/3.2"/>
  <xs:element name="Road" type="app:RoadType" substitutionGroup="gml:AbstractFeature"/>
  <xs:complexType name="RoadType">
    <xs:complexContent>
      <xs:extension base="gml:AbstractFeatureType">
        <xs:sequence>
          <xs:element name="name" type="xs:string"/>
          <xs:element name="lanes" type="xs:integer" minOccurs="0"/>
          <xs:element name="centerline" type="gml:CurvePropertyType"/>
          <xs:element name="next" type="gml:FeaturePropertyType" minOccurs="0" nillable="true"/>
          <xs:element name="class" type="app:RoadClass" minOccurs="0"/>
        </xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:simpleType name="RoadClass">
    <xs:restriction base="xs:integer"/>
  </xs:simpleType>
  <xs:element name="Roads" type="app:RoadsType" substitutionGroup="gml:AbstractFeature"/>
  <xs:complexType name="RoadsType">
    <xs:complexContent>
      <xs:extension base="gml:AbstractFeatureType">
        <xs:sequence>
          <xs:choice>
            <xs:element name="road" type="app:RoadMemberType" maxOccurs="unbounded"/>
          </xs:choice>
        </xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:complexType name="RoadMemberType">
    <xs:complexContent>
      <xs:extension base="gml:AbstractFeatureMemberType">
        <xs:sequence><xs:element ref="app:Road"/></xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
</xs:schema>"#;

    fn app(local: &str) -> QName {
        QName::namespaced("urn:app", local)
    }

    #[test]
    fn test_decode_feature_types() {
        let schema = decode_app_schema(ROADS_32).unwrap();
        let road = schema.feature_type(&app("Road")).unwrap();
        assert_eq!(road.properties.len(), 5);

        let lanes = road.property(&app("lanes")).unwrap();
        assert_eq!(lanes.kind, PropertyKind::Simple(PrimitiveType::Integer));
        assert_eq!(lanes.occurs, Occurs::optional());

        let centerline = road.property(&app("centerline")).unwrap();
        assert_eq!(centerline.kind, PropertyKind::Geometry(GeometryKind::Curve));

        let next = road.property(&app("next")).unwrap();
        assert_eq!(next.kind, PropertyKind::Feature { value_type: None });
        assert!(next.nillable);

        let class = road.property(&app("class")).unwrap();
        assert_eq!(class.kind, PropertyKind::Simple(PrimitiveType::Integer));
    }

    #[test]
    fn test_collection_detection_32() {
        let schema = decode_app_schema(ROADS_32).unwrap();
        let roads = schema.feature_type(&app("Roads")).unwrap();
        assert_eq!(
            roads.property(&app("road")).unwrap().kind,
            PropertyKind::FeatureMember
        );
        assert!(schema.is_feature_collection(roads, GmlVersion::Gml32));
        assert!(!schema.is_feature_collection_element(&app("Road"), GmlVersion::Gml32));
    }

    #[test]
    fn test_collection_detection_pre_32() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:gml="http://www.opengis.net/gml"
               xmlns:app="urn:app" targetNamespace="urn:app" elementFormDefault="qualified">
          <xs:element name="Parcel" substitutionGroup="gml:_Feature">
            <xs:complexType><xs:complexContent><xs:extension base="gml:AbstractFeatureType"><xs:sequence>
              <xs:element name="area" type="gml:MeasureType"/>
              <xs:element name="geom" type="gml:MultiSurfacePropertyType"/>
            </xs:sequence></xs:extension></xs:complexContent></xs:complexType>
          </xs:element>
          <xs:element name="Parcels" substitutionGroup="gml:_FeatureCollection">
            <xs:complexType><xs:complexContent><xs:extension base="gml:AbstractFeatureCollectionType"/></xs:complexContent></xs:complexType>
          </xs:element>
          <xs:element name="Helper" type="xs:string"/>
        </xs:schema>"#;
        let schema = decode_app_schema(xsd).unwrap();
        assert_eq!(schema.feature_types().count(), 2);
        assert!(schema.is_feature_collection_element(&app("Parcels"), GmlVersion::Gml31));
        assert!(!schema.is_feature_collection_element(&app("Parcel"), GmlVersion::Gml31));

        let parcel = schema.feature_type(&app("Parcel")).unwrap();
        assert_eq!(parcel.property(&app("area")).unwrap().kind, PropertyKind::Measure);
        assert_eq!(
            parcel.property(&app("geom")).unwrap().kind,
            PropertyKind::Geometry(GeometryKind::MultiSurface)
        );
    }

    #[test]
    fn test_not_a_schema() {
        assert!(decode_app_schema("<root/>").is_err());
    }
}
