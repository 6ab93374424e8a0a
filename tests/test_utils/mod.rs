#![allow(dead_code)]

use std::sync::{Arc, RwLock};

use rand::prelude::*;

use minidb::{
    btree::page::{BTreeInternalPage, BTreeLeafPage},
    catalog::Table,
    page::{PageCategory, PageId},
    storage::Type,
    utils::{self, small_int_schema, HandyRwLock},
    BTreeTable, Cell, Database, HeapTable, IndexEntry, RecordId, Transaction, Tuple,
};

/// Bring the global environment to a pristine state. Every test touching
/// the database calls this first (and runs `#[serial]`).
pub fn setup() {
    utils::init_log();
    Database::reset();
}

pub fn leaf_entries_cap() -> usize {
    BTreeLeafPage::calculate_slots_count(&Type::Int)
}

pub fn internal_entries_cap() -> usize {
    BTreeInternalPage::get_max_entries(&Type::Int)
}

/// Register a fresh heap table of `columns` int fields.
pub fn new_heap_table(name: &str, columns: usize) -> Arc<RwLock<HeapTable>> {
    let scheme = small_int_schema(columns, "");
    let table_rc = Arc::new(RwLock::new(HeapTable::new(name, &scheme)));
    Database::mut_catalog().add_table(Table::Heap(Arc::clone(&table_rc)), name, "0");
    table_rc
}

/// Register a fresh B+ tree indexed on an int key column.
pub fn new_btree_table(name: &str) -> Arc<RwLock<BTreeTable>> {
    let scheme = small_int_schema(2, "");
    let table_rc = Arc::new(RwLock::new(BTreeTable::new(name, 0, &scheme)));
    Database::mut_catalog().add_table(Table::BTree(Arc::clone(&table_rc)), name, "0");
    table_rc
}

/// An index entry for `key`, with a record id fabricated from the key so
/// duplicates stay distinguishable.
pub fn entry(table: &BTreeTable, key: i32, slot: usize) -> IndexEntry {
    let rid = RecordId::new(
        PageId::new(PageCategory::Heap, table.get_id(), key.unsigned_abs() % 1024),
        slot,
    );
    IndexEntry::new(&Cell::Int(key), &rid)
}

/// Insert `rows` random int keys in one committed transaction; the keys
/// are returned sorted.
pub fn populate_btree_table(table_rc: &Arc<RwLock<BTreeTable>>, rows: usize) -> Vec<i32> {
    let mut rng = rand::thread_rng();
    let mut keys: Vec<i32> = Vec::with_capacity(rows);

    let tx = Transaction::new();
    // borrow of table_rc starts here
    {
        let table = table_rc.rl();
        for slot in 0..rows {
            let key = rng.gen_range(i32::MIN..i32::MAX);
            keys.push(key);
            table.insert_entry(&tx, &entry(&table, key, slot)).unwrap();
        }
    }
    // borrow of table_rc ends here
    tx.commit().unwrap();

    keys.sort();
    keys
}

/// Insert `rows` int tuples with the given values, one committed
/// transaction.
pub fn populate_heap_table(table_rc: &Arc<RwLock<HeapTable>>, values: &[i32], columns: usize) {
    let tx = Transaction::new();
    let table_id = table_rc.rl().get_id();
    for v in values {
        let tuple = Tuple::new_int_tuple(*v, columns);
        Database::buffer_pool()
            .insert_tuple(&tx, table_id, &tuple)
            .unwrap();
    }
    tx.commit().unwrap();
}

/// All key values currently in the tree, in iteration order.
pub fn collect_keys(table: &BTreeTable, tx: &Transaction) -> Vec<i32> {
    table
        .iter(tx)
        .map(|e| e.get_key().get_int().unwrap())
        .collect()
}
