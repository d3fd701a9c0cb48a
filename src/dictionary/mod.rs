//! Runtime-loaded PGN dictionary.
//!
//! The embedded ancestor of this crate baked its PGN descriptors into the
//! binary at build time by downloading and compiling a canboat-style
//! `canboat.json` manifest. A router gateway cannot assume network access or
//! a reproducible build step at deploy time, so instead the dictionary is a
//! plain data document (JSON, see [`DictionaryDocument`]) loaded once at
//! process startup into an owned, read-only index.
//!
//! A compact default dictionary covering a representative spread of field
//! kinds ships with the crate (see [`default_document`]) and can be extended
//! or entirely replaced by the host application.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::PgnDescriptor;
use crate::error::DictionaryLoadError;

/// A single enumeration value: raw code paired with its label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumEntry {
    pub value: u32,
    pub label: String,
}

/// A named lookup table, referenced by [`crate::core::FieldDescriptor::enum_direct_name`]
/// or `enum_indirect_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumTable {
    pub name: String,
    pub entries: Vec<EnumEntry>,
}

/// On-disk/wire shape of a dictionary: a flat list of PGN descriptors plus
/// the enumeration tables they reference.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DictionaryDocument {
    #[serde(default)]
    pub pgns: Vec<PgnDescriptor>,
    #[serde(default)]
    pub enums: Vec<EnumTable>,
}

/// Read-only index built from a [`DictionaryDocument`].
///
/// Construction validates the document (§4.1): duplicate PGNs, fields
/// referencing unknown enumerations, and overlapping bit ranges are rejected
/// at load time rather than surfacing later as decode failures.
#[derive(Debug, Default)]
pub struct PgnDictionary {
    by_pgn: HashMap<u32, PgnDescriptor>,
    enums: HashMap<String, HashMap<u32, String>>,
}

impl PgnDictionary {
    /// Validate and index a document, producing a ready-to-use dictionary.
    pub fn load(document: DictionaryDocument) -> Result<Self, DictionaryLoadError> {
        let mut by_pgn = HashMap::with_capacity(document.pgns.len());
        for descriptor in document.pgns {
            if by_pgn.contains_key(&descriptor.id) {
                return Err(DictionaryLoadError::DuplicatePgn { pgn: descriptor.id });
            }
            check_field_overlaps(&descriptor)?;
            by_pgn.insert(descriptor.id, descriptor);
        }

        let mut enums = HashMap::with_capacity(document.enums.len());
        for table in document.enums {
            let mut values = HashMap::with_capacity(table.entries.len());
            for entry in table.entries {
                values.insert(entry.value, entry.label);
            }
            enums.insert(table.name, values);
        }

        // Every enum referenced by a field must exist in the table set.
        for descriptor in by_pgn.values() {
            for field in &descriptor.fields {
                for referenced in [&field.enum_direct_name, &field.enum_indirect_name]
                    .into_iter()
                    .flatten()
                {
                    if !enums.contains_key(referenced) {
                        return Err(DictionaryLoadError::UnknownEnum {
                            enum_name: referenced.clone(),
                            pgn: descriptor.id,
                        });
                    }
                }
            }
        }

        Ok(Self { by_pgn, enums })
    }

    /// Parse and load a dictionary document from its JSON text representation.
    pub fn from_json(text: &str) -> Result<Self, DictionaryLoadError> {
        let document: DictionaryDocument = serde_json::from_str(text)?;
        Self::load(document)
    }

    /// Load the default dictionary bundled with the crate.
    pub fn bundled() -> Result<Self, DictionaryLoadError> {
        Self::from_json(default_document_json())
    }

    /// Look up a PGN's descriptor.
    pub fn lookup_pgn(&self, pgn: u32) -> Option<&PgnDescriptor> {
        self.by_pgn.get(&pgn)
    }

    /// Resolve a raw value against a named enumeration table.
    pub fn lookup_enum(&self, table: &str, value: u32) -> Option<&str> {
        self.enums.get(table)?.get(&value).map(String::as_str)
    }

    /// Number of PGNs currently indexed.
    pub fn len(&self) -> usize {
        self.by_pgn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pgn.is_empty()
    }

    /// Iterate over every indexed descriptor (diagnostics, `!PGNST` support).
    pub fn iter(&self) -> impl Iterator<Item = &PgnDescriptor> {
        self.by_pgn.values()
    }
}

fn check_field_overlaps(descriptor: &PgnDescriptor) -> Result<(), DictionaryLoadError> {
    let mut occupied: Vec<(u32, u32)> = Vec::with_capacity(descriptor.fields.len());
    for field in &descriptor.fields {
        let (Some(offset), Some(bits)) = (field.bits_offset, field.bits_length) else {
            continue;
        };
        let range = (offset, offset + bits);
        for &(existing_start, existing_end) in &occupied {
            if range.0 < existing_end && existing_start < range.1 {
                return Err(DictionaryLoadError::FieldOverlap {
                    field_id: field.id.clone(),
                    pgn: descriptor.id,
                });
            }
        }
        occupied.push(range);
    }
    Ok(())
}

/// Compact default dictionary, bundled as a JSON document in the crate.
/// Exercises every [`crate::core::FieldKind`] used by the codec engine so
/// the router can decode a small but representative PGN set without the
/// host application supplying its own dictionary.
pub fn default_document_json() -> &'static str {
    include_str!("default_dictionary.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_dictionary_loads_and_indexes_every_pgn() {
        let dict = PgnDictionary::bundled().expect("bundled dictionary must be valid");
        assert!(!dict.is_empty());
        assert!(dict.lookup_pgn(127250).is_some(), "heading PGN must be present");
    }

    #[test]
    fn duplicate_pgn_is_rejected() {
        let doc = DictionaryDocument {
            pgns: vec![
                minimal_descriptor(127250),
                minimal_descriptor(127250),
            ],
            enums: vec![],
        };
        let err = PgnDictionary::load(doc).unwrap_err();
        assert!(matches!(err, DictionaryLoadError::DuplicatePgn { pgn: 127250 }));
    }

    #[test]
    fn unknown_enum_reference_is_rejected() {
        use crate::core::{FieldDescriptor, FieldKind};

        let mut descriptor = minimal_descriptor(65000);
        descriptor.fields.push(FieldDescriptor {
            id: "Mode".into(),
            name: "Mode".into(),
            kind: FieldKind::Lookup,
            bits_length: Some(8),
            bits_length_var: None,
            bits_offset: Some(0),
            is_signed: Some(false),
            resolution: None,
            enum_direct_name: Some("MISSING_TABLE".into()),
            enum_indirect_name: None,
            enum_indirect_field_order: None,
            physical_unit: None,
            physical_qtity: None,
        });
        let doc = DictionaryDocument {
            pgns: vec![descriptor],
            enums: vec![],
        };
        let err = PgnDictionary::load(doc).unwrap_err();
        assert!(matches!(err, DictionaryLoadError::UnknownEnum { .. }));
    }

    fn minimal_descriptor(id: u32) -> PgnDescriptor {
        PgnDescriptor {
            id,
            name: format!("Pgn{id}"),
            description: String::new(),
            priority: Some(6),
            fastpacket: false,
            length: Some(8),
            field_count: Some(0),
            trans_interval: None,
            trans_irregular: None,
            fields: vec![],
            repeating_field_sets: vec![],
        }
    }
}
