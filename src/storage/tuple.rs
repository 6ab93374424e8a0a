use std::fmt;

use crate::{
    error::{DbError, DbResult},
    io::{ByteReader, ByteWriter},
    page::PageId,
    storage::{cell::Cell, schema::Schema},
};

/// On-disk location of a tuple: the page holding it and the slot within.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub pid: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(pid: PageId, slot: usize) -> Self {
        Self { pid, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{}#{}>", self.pid, self.slot)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A row: a schema plus one cell per column. Tuples without a record id
/// are transient, i.e. not stored on any page yet.
#[derive(Clone)]
pub struct Tuple {
    scheme: Schema,
    cells: Vec<Cell>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(scheme: &Schema, cells: &[Cell]) -> DbResult<Self> {
        if cells.len() != scheme.fields_count() {
            return Err(DbError::SchemaMismatch(format!(
                "{} cells for a {}-column schema",
                cells.len(),
                scheme.fields_count()
            )));
        }
        Ok(Self {
            scheme: scheme.clone(),
            cells: cells.to_vec(),
            record_id: None,
        })
    }

    /// A tuple of `columns` int fields, all set to `value`. Handy for
    /// tests and bulk loaders.
    pub fn new_int_tuple(value: i32, columns: usize) -> Self {
        let scheme = crate::utils::small_int_schema(columns, "");
        Self {
            scheme,
            cells: vec![Cell::Int(value); columns],
            record_id: None,
        }
    }

    pub fn get_scheme(&self) -> &Schema {
        &self.scheme
    }

    pub fn get_cell(&self, i: usize) -> Cell {
        self.cells[i].clone()
    }

    /// The cell vector is pre-sized to the schema length; indices past the
    /// end are rejected rather than treated as an append.
    pub fn set_cell(&mut self, i: usize, cell: Cell) -> DbResult<()> {
        if i >= self.cells.len() {
            return Err(DbError::NoSuchField(format!(
                "cell index {} out of {}",
                i,
                self.cells.len()
            )));
        }
        self.cells[i] = cell;
        Ok(())
    }

    pub fn get_record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    pub fn encode(&self, writer: &mut ByteWriter) {
        for (i, cell) in self.cells.iter().enumerate() {
            cell.encode(writer, &self.scheme.fields[i].field_type);
        }
    }

    pub fn decode(reader: &mut ByteReader, scheme: &Schema) -> Self {
        let mut cells = Vec::with_capacity(scheme.fields_count());
        for field in &scheme.fields {
            cells.push(Cell::decode(reader, &field.field_type));
        }
        Self {
            scheme: scheme.clone(),
            cells,
            record_id: None,
        }
    }
}

/// Value equality; where a tuple happens to be stored does not matter.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let body: Vec<String> = self.cells.iter().map(|c| format!("{}", c)).collect();
        write!(f, "{{{}}}", body.join(", "))
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
