use crate::models::{Direction, GenericRecord};
use std::collections::BTreeMap;

// ============================================================================
// Field Mapper
// ============================================================================
//
// Stateless translation between the two stores' field vocabularies. Each
// direction is driven by its own immutable MappingTable:
//
//   document -> relational : fixed five-field allow-list (renames allowed)
//   relational -> document : passthrough, every field verbatim
//
// Absent source fields stay absent in the output; nothing is defaulted.
//
// ============================================================================

/// Patient fields accepted by the relational service.
pub const RELATIONAL_FIELDS: [&str; 5] = [
    "nomeCompleto",
    "dataNascimento",
    "cpf",
    "endereco",
    "telefone",
];

/// Source field -> target field rules for one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTable {
    rules: BTreeMap<String, String>,
    keep_unmapped: bool,
}

impl MappingTable {
    /// Only the listed fields survive, renamed to their targets.
    pub fn allow_list<I, S, T>(rules: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(|(source, target)| (source.into(), target.into()))
                .collect(),
            keep_unmapped: false,
        }
    }

    /// Every field survives; listed fields are renamed.
    pub fn passthrough() -> Self {
        Self {
            rules: BTreeMap::new(),
            keep_unmapped: true,
        }
    }

    /// Table for events from the document system.
    pub fn to_relational() -> Self {
        Self::allow_list(RELATIONAL_FIELDS.iter().map(|f| (*f, *f)))
    }

    /// Table for events from the relational system.
    pub fn to_document() -> Self {
        Self::passthrough()
    }

    pub fn apply(&self, record: &GenericRecord) -> GenericRecord {
        record
            .iter()
            .filter_map(|(name, value)| match self.rules.get(name) {
                Some(target) => Some((target.clone(), value.clone())),
                None if self.keep_unmapped => Some((name.clone(), value.clone())),
                None => None,
            })
            .collect()
    }
}

/// Holds the table for each direction; built once at startup.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    to_relational: MappingTable,
    to_document: MappingTable,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new(MappingTable::to_relational(), MappingTable::to_document())
    }
}

impl FieldMapper {
    pub fn new(to_relational: MappingTable, to_document: MappingTable) -> Self {
        Self {
            to_relational,
            to_document,
        }
    }

    pub fn map_to_relational(&self, record: &GenericRecord) -> GenericRecord {
        self.to_relational.apply(record)
    }

    pub fn map_to_document(&self, record: &GenericRecord) -> GenericRecord {
        self.to_document.apply(record)
    }

    pub fn map(&self, direction: Direction, record: &GenericRecord) -> GenericRecord {
        match direction {
            Direction::DocumentToRelational => self.map_to_relational(record),
            Direction::RelationalToDocument => self.map_to_document(record),
        }
    }
}
