use std::hash::{Hash, Hasher};

use crate::error::{DbError, DbResult};

/// Column types. Strings are fixed-length with a per-column bound and
/// occupy a constant number of bytes on disk.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    Int,
    Char(usize),
}

impl Type {
    /// On-disk width in bytes. Strings carry a 4-byte actual-length prefix
    /// followed by the padded payload.
    pub fn get_len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Char(max_len) => 4 + max_len,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldItem {
    pub field_type: Type,
    pub field_name: String,
}

impl FieldItem {
    pub fn new(name: &str, field_type: Type) -> Self {
        Self {
            field_type,
            field_name: name.to_string(),
        }
    }
}

/// Row schema: an ordered sequence of typed, optionally named columns.
#[derive(Clone, Debug)]
pub struct Schema {
    pub fields: Vec<FieldItem>,
}

impl Schema {
    pub fn new(fields: Vec<FieldItem>) -> Self {
        Self { fields }
    }

    pub fn fields_count(&self) -> usize {
        self.fields.len()
    }

    /// Byte size of one row under this schema.
    pub fn get_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.get_len()).sum()
    }

    pub fn get_type(&self, i: usize) -> DbResult<Type> {
        match self.fields.get(i) {
            Some(f) => Ok(f.field_type),
            None => Err(DbError::NoSuchField(format!("field index {}", i))),
        }
    }

    /// Index of the first field with the given name.
    pub fn get_field_index(&self, name: &str) -> DbResult<usize> {
        self.fields
            .iter()
            .position(|f| f.field_name == name)
            .ok_or_else(|| DbError::NoSuchField(name.to_string()))
    }
}

/// Two schemas are interchangeable iff their type sequences match; field
/// names carry no weight.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for f in &self.fields {
            f.field_type.hash(state);
        }
    }
}
