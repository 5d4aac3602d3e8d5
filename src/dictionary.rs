//! GML dictionaries and definitions
//!
//! Only the generic structure is read: ids, names, description and
//! identifier of each definition plus the nesting of dictionaries. Every
//! definition and dictionary is registered with the [`DocumentIdContext`] so
//! that `xlink:href` references to it resolve.

use crate::error::{Error, Result};
use crate::namespaces::{QName, XLINK_NS};
use crate::reference::{DocumentIdContext, GmlObject, GmlReference, ObjectCategory};
use crate::version::GmlVersion;
use crate::xml::XmlCursor;
use std::rc::Rc;
use tracing::warn;

/// A `gml:Definition` or any element derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// Element name (`gml:Definition`, or a derived element)
    pub name: QName,
    /// `gml:id`
    pub id: String,
    /// `gml:name` values
    pub names: Vec<String>,
    /// `gml:description`
    pub description: Option<String>,
    /// `gml:identifier` (GML 3.2)
    pub identifier: Option<String>,
    /// `codeSpace` of the identifier
    pub code_space: Option<String>,
}

/// Entry of a dictionary
#[derive(Debug, Clone)]
pub enum DictionaryEntry {
    /// Inline definition
    Definition(Rc<Definition>),
    /// Nested dictionary
    Dictionary(Rc<Dictionary>),
    /// `xlink:href` to a definition
    Reference(GmlReference),
}

/// `gml:Dictionary` or `gml:DefinitionCollection`
#[derive(Debug, Clone)]
pub struct Dictionary {
    /// The dictionary's own definition data
    pub definition: Definition,
    /// `gml:id`
    pub id: String,
    /// Entries in document order
    pub entries: Vec<DictionaryEntry>,
}

impl Dictionary {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True without entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inline definition with the given id, searched recursively
    pub fn find(&self, id: &str) -> Option<Rc<Definition>> {
        self.entries.iter().find_map(|entry| match entry {
            DictionaryEntry::Definition(d) if d.id == id => Some(Rc::clone(d)),
            DictionaryEntry::Dictionary(nested) => nested.find(id),
            DictionaryEntry::Reference(r) => match r.object() {
                Some(GmlObject::Definition(d)) if d.id == id => Some(d),
                _ => None,
            },
            _ => None,
        })
    }
}

/// Whether `name` is a dictionary element of `version`
pub fn is_dictionary_element(version: GmlVersion, name: &QName) -> bool {
    !version.is_gml2()
        && name.in_namespace(version.namespace())
        && matches!(name.local_name.as_str(), "Dictionary" | "DefinitionCollection")
}

/// Reads dictionaries for one GML 3 version
#[derive(Debug, Clone)]
pub struct DictionaryReader {
    version: GmlVersion,
    lax: bool,
}

impl DictionaryReader {
    /// Create a reader
    pub fn new(version: GmlVersion, lax: bool) -> Self {
        Self { version, lax }
    }

    fn ns(&self) -> &'static str {
        self.version.namespace()
    }

    /// Read the dictionary at the cursor; leaves the cursor on its end tag
    pub fn read_dictionary(&self, cursor: &mut XmlCursor<'_>, ids: &mut DocumentIdContext) -> Result<Dictionary> {
        if self.version.is_gml2() {
            return Err(Error::Unsupported("GML 2 has no dictionaries".to_string()));
        }
        let name = cursor.require_start()?.clone();
        if !is_dictionary_element(self.version, &name) {
            return Err(cursor.parse_error(format!(
                "Expected 'gml:Dictionary' or 'gml:DefinitionCollection', found '{}'.",
                name
            )));
        }

        let mut definition = self.start_definition(cursor, &name)?;
        let mut entries = Vec::new();
        loop {
            cursor.next_tag()?;
            if cursor.is_end() {
                break;
            }
            let child = cursor.require_start()?.clone();
            if child.is(self.ns(), "dictionaryEntry") || child.is(self.ns(), "definitionMember") {
                entries.push(self.read_entry(cursor, ids, &child)?);
            } else if !self.read_standard_property(cursor, &child, &mut definition)? {
                let msg = format!("Unexpected element '{}' in dictionary '{}'.", child, definition.id);
                if !self.lax {
                    return Err(cursor.parse_error(msg));
                }
                warn!("{}", msg);
                cursor.skip_element()?;
            }
        }
        cursor.require_end(&name)?;

        Ok(Dictionary {
            id: definition.id.clone(),
            definition,
            entries,
        })
    }

    fn read_entry(
        &self,
        cursor: &mut XmlCursor<'_>,
        ids: &mut DocumentIdContext,
        property: &QName,
    ) -> Result<DictionaryEntry> {
        if let Some(href) = cursor.attribute_ns(XLINK_NS, "href").map(str::to_string) {
            let reference = ids
                .create_reference(&href, ObjectCategory::Definition)
                .map_err(|e| cursor.locate(e))?;
            cursor.skip_element()?;
            return Ok(DictionaryEntry::Reference(reference));
        }

        cursor.next_tag()?;
        let element = cursor.require_start()?.clone();
        let entry = if is_dictionary_element(self.version, &element) {
            let dictionary = Rc::new(self.read_dictionary(cursor, ids)?);
            ids.register_object(GmlObject::Dictionary(Rc::clone(&dictionary)))
                .map_err(|e| cursor.locate(e))?;
            DictionaryEntry::Dictionary(dictionary)
        } else {
            let definition = Rc::new(self.read_definition(cursor)?);
            ids.register_object(GmlObject::Definition(Rc::clone(&definition)))
                .map_err(|e| cursor.locate(e))?;
            DictionaryEntry::Definition(definition)
        };
        cursor.next_tag()?;
        cursor.require_end(property)?;
        Ok(entry)
    }

    /// Read a definition element; leaves the cursor on its end tag
    pub fn read_definition(&self, cursor: &mut XmlCursor<'_>) -> Result<Definition> {
        let name = cursor.require_start()?.clone();
        let mut definition = self.start_definition(cursor, &name)?;
        loop {
            cursor.next_tag()?;
            if cursor.is_end() {
                break;
            }
            let child = cursor.require_start()?.clone();
            if !self.read_standard_property(cursor, &child, &mut definition)? {
                // derived definitions carry properties of their own
                cursor.skip_element()?;
            }
        }
        cursor.require_end(&name)?;
        Ok(definition)
    }

    fn start_definition(&self, cursor: &XmlCursor<'_>, name: &QName) -> Result<Definition> {
        let id = match cursor.attribute_ns(self.ns(), "id") {
            Some(id) => id.to_string(),
            None => {
                return Err(cursor.parse_error(format!(
                    "Element '{}' is missing the required attribute 'gml:id'.",
                    name
                )))
            }
        };
        Ok(Definition {
            name: name.clone(),
            id,
            names: Vec::new(),
            description: None,
            identifier: None,
            code_space: None,
        })
    }

    fn read_standard_property(
        &self,
        cursor: &mut XmlCursor<'_>,
        child: &QName,
        definition: &mut Definition,
    ) -> Result<bool> {
        if !child.in_namespace(self.ns()) {
            return Ok(false);
        }
        match child.local_name.as_str() {
            "name" => definition.names.push(cursor.element_text()?),
            "description" => definition.description = Some(cursor.element_text()?),
            "identifier" => {
                definition.code_space = cursor.attribute("codeSpace").map(str::to_string);
                definition.identifier = Some(cursor.element_text()?);
            }
            "metaDataProperty" | "descriptionReference" | "remarks" => cursor.skip_element()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICTIONARY: &str = r##"<gml:Dictionary xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:xlink="http://www.w3.org/1999/xlink" gml:id="units">
      <gml:description>Units</gml:description>
      <gml:identifier codeSpace="urn:test">units</gml:identifier>
      <gml:dictionaryEntry>
        <gml:Definition gml:id="m"><gml:identifier codeSpace="urn:test">m</gml:identifier><gml:name>metre</gml:name></gml:Definition>
      </gml:dictionaryEntry>
      <gml:dictionaryEntry>
        <gml:Dictionary gml:id="nested"><gml:identifier codeSpace="urn:test">nested</gml:identifier>
          <gml:dictionaryEntry><gml:Definition gml:id="ft"><gml:identifier codeSpace="urn:test">ft</gml:identifier></gml:Definition></gml:dictionaryEntry>
        </gml:Dictionary>
      </gml:dictionaryEntry>
      <gml:dictionaryEntry xlink:href="#m"/>
    </gml:Dictionary>"##;

    #[test]
    fn test_read_dictionary() {
        let reader = DictionaryReader::new(GmlVersion::Gml32, false);
        let mut ids = DocumentIdContext::new(GmlVersion::Gml32);
        let mut cursor = XmlCursor::from_str(DICTIONARY);
        cursor.next_tag().unwrap();
        let dictionary = reader.read_dictionary(&mut cursor, &mut ids).unwrap();

        assert_eq!(dictionary.id, "units");
        assert_eq!(dictionary.definition.description.as_deref(), Some("Units"));
        assert_eq!(dictionary.len(), 3);
        assert_eq!(dictionary.find("ft").unwrap().identifier.as_deref(), Some("ft"));
        assert_eq!(dictionary.find("m").unwrap().names, vec!["metre".to_string()]);
        assert!(ids.get_object("nested").is_some());

        match &dictionary.entries[2] {
            DictionaryEntry::Reference(r) => assert!(r.is_resolved()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_id() {
        let reader = DictionaryReader::new(GmlVersion::Gml31, false);
        let mut ids = DocumentIdContext::new(GmlVersion::Gml31);
        let mut cursor = XmlCursor::from_str(r#"<gml:Dictionary xmlns:gml="http://www.opengis.net/gml"/>"#);
        cursor.next_tag().unwrap();
        let err = reader.read_dictionary(&mut cursor, &mut ids).unwrap_err();
        assert!(err.to_string().contains("gml:id"));
    }

    #[test]
    fn test_gml2_unsupported() {
        let reader = DictionaryReader::new(GmlVersion::Gml2, false);
        let mut ids = DocumentIdContext::new(GmlVersion::Gml2);
        let mut cursor = XmlCursor::from_str(r#"<gml:Dictionary xmlns:gml="http://www.opengis.net/gml"/>"#);
        cursor.next_tag().unwrap();
        assert!(matches!(
            reader.read_dictionary(&mut cursor, &mut ids),
            Err(Error::Unsupported(_))
        ));
    }
}
