use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    sync::{Mutex, MutexGuard},
};

use log::debug;

use crate::{
    buffer_pool::BufferPool,
    error::{DbError, DbResult},
    heap::page::HeapPageIteratorRc,
    page::{PageCategory, PageId},
    storage::{Schema, Tuple},
    transaction::{Permission, Transaction},
    utils::ceil_div,
    Database,
};

/// A paged file of tuples in no particular order.
pub struct HeapTable {
    pub name: String,

    pub scheme: Schema,

    file: Mutex<File>,

    table_id: u32,
}

impl HeapTable {
    pub fn new(table_name: &str, scheme: &Schema) -> Self {
        let table_path = Database::global()
            .get_path()
            .join(table_name)
            .with_extension("table");

        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .open(&table_path)
            .unwrap();

        // The table id is the hash of the backing file's absolute path, so
        // reopening the same file yields the same id.
        let absolute = table_path
            .canonicalize()
            .unwrap_or_else(|_| table_path.clone());
        let mut hasher = DefaultHasher::new();
        absolute.hash(&mut hasher);
        let table_id = hasher.finish() as u32;

        Self {
            name: table_name.to_string(),
            scheme: scheme.clone(),
            file: Mutex::new(file),
            table_id,
        }
    }

    pub fn get_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_scheme(&self) -> Schema {
        self.scheme.clone()
    }

    pub fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    pub fn pages_count(&self) -> usize {
        let len = self.get_file().metadata().unwrap().len() as usize;
        ceil_div(len, BufferPool::get_page_size())
    }

    /// Raw page bytes at the given index. A tail shorter than a full page
    /// (or entirely past the end of the file) reads as zeroes.
    pub fn read_page_bytes(&self, page_index: u32) -> DbResult<Vec<u8>> {
        let page_size = BufferPool::get_page_size();
        let start = page_index as usize * page_size;

        let mut file = self.get_file();
        let len = file.metadata()?.len() as usize;

        let mut buf = vec![0; page_size];
        if start < len {
            file.seek(SeekFrom::Start(start as u64))?;
            let available = (len - start).min(page_size);
            file.read_exact(&mut buf[..available])?;
        }
        Ok(buf)
    }

    pub fn write_page_bytes(&self, page_index: u32, data: &[u8]) -> DbResult<()> {
        let start = page_index as usize * BufferPool::get_page_size();
        let mut file = self.get_file();
        file.seek(SeekFrom::Start(start as u64))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Insert into the first page with a free slot, extending the file
    /// with a fresh page when every existing one is packed. Returns the
    /// pages dirtied on behalf of the transaction.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult<Vec<PageId>> {
        for i in 0..self.pages_count() {
            let pid = PageId::new(PageCategory::Heap, self.table_id, i as u32);
            let page_rc =
                Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;

            let mut page = page_rc.write().unwrap();
            if page.empty_slots_count() > 0 {
                page.insert_tuple(tuple)?;
                return Ok(vec![pid]);
            }
        }

        // every page is full: extend the file right away so the page count
        // advances, then run the insert through the buffer pool
        let pid = PageId::new(
            PageCategory::Heap,
            self.table_id,
            self.pages_count() as u32,
        );
        debug!("heap table {} grows to page {}", self.name, pid.page_index);
        self.write_page_bytes(pid.page_index, &vec![0; BufferPool::get_page_size()])?;

        let page_rc = Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;
        page_rc.write().unwrap().insert_tuple(tuple)?;
        Ok(vec![pid])
    }

    /// Clear the slot the tuple's record id points at.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult<Vec<PageId>> {
        let rid = tuple
            .get_record_id()
            .ok_or_else(|| DbError::SlotEmpty("tuple has no record id".to_string()))?;

        let page_rc =
            Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &rid.pid)?;
        let mut victim = tuple.clone();
        page_rc.write().unwrap().delete_tuple(&mut victim)?;
        Ok(vec![rid.pid])
    }

    pub fn iter(&self, tx: &Transaction) -> HeapTableIterator {
        HeapTableIterator::new(tx, self)
    }

    /// Total number of stored tuples; scans the whole file.
    pub fn tuples_count(&self, tx: &Transaction) -> usize {
        let mut it = self.iter(tx);
        it.open();
        it.by_ref().count()
    }
}

/// Cursor over all tuples of a heap table, page by page. Pages are taken
/// through the buffer pool with read-only permission.
pub struct HeapTableIterator {
    tx: Transaction,
    table_id: u32,
    pages_count: usize,

    current_page: i64,
    page_it: Option<HeapPageIteratorRc>,
    opened: bool,
}

impl HeapTableIterator {
    pub fn new(tx: &Transaction, table: &HeapTable) -> Self {
        Self {
            tx: *tx,
            table_id: table.get_id(),
            pages_count: table.pages_count(),
            current_page: -1,
            page_it: None,
            opened: false,
        }
    }

    pub fn open(&mut self) {
        self.opened = true;
    }

    pub fn rewind(&mut self) {
        self.current_page = -1;
        self.page_it = None;
    }

    pub fn close(&mut self) {
        self.opened = false;
        self.current_page = -1;
        self.page_it = None;
    }

    fn load_page(&mut self, page_index: u32) -> DbResult<()> {
        let pid = PageId::new(PageCategory::Heap, self.table_id, page_index);
        let page_rc =
            Database::buffer_pool().get_heap_page(&self.tx, Permission::ReadOnly, &pid)?;
        self.page_it = Some(HeapPageIteratorRc::new(page_rc));
        Ok(())
    }
}

impl Iterator for HeapTableIterator {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.opened {
            return None;
        }

        loop {
            if let Some(it) = self.page_it.as_mut() {
                if let Some(t) = it.next() {
                    return Some(t);
                }
            }

            // advance only when the current page is exhausted
            if self.current_page + 1 >= self.pages_count as i64 {
                return None;
            }
            self.current_page += 1;
            if self.load_page(self.current_page as u32).is_err() {
                return None;
            }
        }
    }
}
