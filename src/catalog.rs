use std::collections::HashMap;

use log::debug;

use crate::{
    btree::BTreeTable,
    error::{DbError, DbResult},
    heap::HeapTable,
    storage::schema::{Schema, Type},
    types::Pod,
    utils::HandyRwLock,
};

/// A registered table file of either kind, shared by handle. Exposes the
/// surface the buffer pool needs without caring which kind it is.
pub enum Table {
    Heap(Pod<HeapTable>),
    BTree(Pod<BTreeTable>),
}

impl Clone for Table {
    fn clone(&self) -> Self {
        match self {
            Table::Heap(t) => Table::Heap(Pod::clone(t)),
            Table::BTree(t) => Table::BTree(Pod::clone(t)),
        }
    }
}

impl Table {
    pub fn get_id(&self) -> u32 {
        match self {
            Table::Heap(t) => t.rl().get_id(),
            Table::BTree(t) => t.rl().get_id(),
        }
    }

    pub fn get_scheme(&self) -> Schema {
        match self {
            Table::Heap(t) => t.rl().get_scheme(),
            Table::BTree(t) => t.rl().get_scheme(),
        }
    }

    /// The type of the indexed column; only meaningful for B+ trees.
    pub fn key_type(&self) -> DbResult<Type> {
        match self {
            Table::BTree(t) => Ok(t.rl().key_type()),
            Table::Heap(t) => Err(DbError::InvalidPage(format!(
                "heap table {} has no key column",
                t.rl().get_id()
            ))),
        }
    }

    pub fn read_page_bytes(&self, page_index: u32) -> DbResult<Vec<u8>> {
        match self {
            Table::Heap(t) => t.rl().read_page_bytes(page_index),
            Table::BTree(t) => t.rl().read_page_bytes(page_index),
        }
    }

    pub fn write_page_bytes(&self, page_index: u32, data: &[u8]) -> DbResult<()> {
        match self {
            Table::Heap(t) => t.rl().write_page_bytes(page_index, data),
            Table::BTree(t) => t.rl().write_page_bytes(page_index, data),
        }
    }

    pub fn heap(&self) -> DbResult<Pod<HeapTable>> {
        match self {
            Table::Heap(t) => Ok(Pod::clone(t)),
            Table::BTree(_) => Err(DbError::NoSuchTable("not a heap table".to_string())),
        }
    }

    pub fn btree(&self) -> DbResult<Pod<BTreeTable>> {
        match self {
            Table::BTree(t) => Ok(Pod::clone(t)),
            Table::Heap(_) => Err(DbError::NoSuchTable("not a b+tree table".to_string())),
        }
    }
}

struct CatalogItem {
    table: Table,
    name: String,
    primary_key: String,
}

/// Registry of tables by id and by display name. Ids come from hashing
/// the backing file's path, so re-registering the same file overwrites
/// its entry.
pub struct Catalog {
    tables: HashMap<u32, CatalogItem>,
    name_to_id: HashMap<String, u32>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            name_to_id: HashMap::new(),
        }
    }

    /// Register a table. Re-adding the same id replaces the entry;
    /// reusing a name for a different file rebinds the name.
    pub fn add_table(&mut self, table: Table, name: &str, primary_key: &str) {
        let id = table.get_id();

        if let Some(old_id) = self.name_to_id.get(name).copied() {
            if old_id != id {
                self.tables.remove(&old_id);
            }
        }

        debug!("catalog registers table {} (id {})", name, id);
        self.name_to_id.insert(name.to_string(), id);
        self.tables.insert(
            id,
            CatalogItem {
                table,
                name: name.to_string(),
                primary_key: primary_key.to_string(),
            },
        );
    }

    pub fn get_table(&self, table_id: u32) -> DbResult<Table> {
        self.tables
            .get(&table_id)
            .map(|item| item.table.clone())
            .ok_or_else(|| DbError::NoSuchTable(format!("id {}", table_id)))
    }

    pub fn get_table_by_name(&self, name: &str) -> DbResult<Table> {
        let id = self
            .name_to_id
            .get(name)
            .ok_or_else(|| DbError::NoSuchTable(name.to_string()))?;
        self.get_table(*id)
    }

    pub fn get_table_name(&self, table_id: u32) -> DbResult<String> {
        self.tables
            .get(&table_id)
            .map(|item| item.name.clone())
            .ok_or_else(|| DbError::NoSuchTable(format!("id {}", table_id)))
    }

    pub fn get_primary_key(&self, table_id: u32) -> DbResult<String> {
        self.tables
            .get(&table_id)
            .map(|item| item.primary_key.clone())
            .ok_or_else(|| DbError::NoSuchTable(format!("id {}", table_id)))
    }

    pub fn get_scheme(&self, table_id: u32) -> DbResult<Schema> {
        Ok(self.get_table(table_id)?.get_scheme())
    }

    pub fn table_ids(&self) -> Vec<u32> {
        self.tables.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.name_to_id.clear();
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
