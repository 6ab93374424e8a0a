use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    ops::DerefMut,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, MutexGuard,
    },
};

use log::debug;

use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreeRootPointerPage,
    },
    buffer_pool::BufferPool,
    error::{DbError, DbResult},
    page::{BasePage, Page, PageCategory, PageId},
    predicate::Op,
    storage::{cell::Cell, schema::{Schema, Type}},
    transaction::{Permission, Transaction},
    types::{Pod, ResultPod},
    utils::HandyRwLock,
    Database,
};

pub enum SearchFor {
    /// Position on the left-most leaf that may hold the key under the
    /// given operator.
    Target(Cell, Op),
    LeftMost,
    RightMost,
}

/// A single-file B+ tree index. Page 0 is the root pointer; node pages
/// are allocated on demand and recycled through header-page bitmaps.
pub struct BTreeTable {
    pub name: String,

    /// The indexed column of the table's schema; its type is the key
    /// type of the tree.
    pub key_field: usize,

    pub scheme: Schema,

    file: Mutex<File>,

    table_id: u32,

    // index of the last allocated page, starts at 1 (the initial leaf)
    page_index: AtomicU32,
}

pub(crate) fn mark_dirty<P>(tx: &Transaction, rc: &Pod<P>)
where
    P: DerefMut<Target = BasePage>,
{
    rc.wl().set_dirty(Some(*tx));
}

impl BTreeTable {
    pub fn new(table_name: &str, key_field: usize, scheme: &Schema) -> Self {
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

        let absolute = table_path
            .canonicalize()
            .unwrap_or_else(|_| table_path.clone());
        let mut hasher = DefaultHasher::new();
        absolute.hash(&mut hasher);
        let table_id = hasher.finish() as u32;

        let table = Self {
            name: table_name.to_string(),
            key_field,
            scheme: scheme.clone(),
            file: Mutex::new(file),
            table_id,
            page_index: AtomicU32::new(1),
        };
        table.file_init();

        let last_index = (table.raw_file_size() / BufferPool::get_page_size() as u64) as u32;
        table.page_index.store(last_index.saturating_sub(1).max(1), Ordering::Relaxed);

        table
    }

    /// Write the root pointer and the initial empty leaf when the
    /// backing file is brand new.
    fn file_init(&self) {
        if self.raw_file_size() > 0 {
            return;
        }
        let mut file = self.get_file();
        file.write_all(&BTreeRootPointerPage::init_page_data())
            .unwrap();
        file.write_all(&BasePage::empty_page_data()).unwrap();
        file.flush().unwrap();
    }

    fn raw_file_size(&self) -> u64 {
        self.get_file().metadata().unwrap().len()
    }

    pub fn get_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_scheme(&self) -> Schema {
        self.scheme.clone()
    }

    pub fn key_type(&self) -> Type {
        self.scheme.fields[self.key_field].field_type
    }

    pub fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    /// Pages in the file, the root pointer not included.
    pub fn pages_count(&self) -> usize {
        let len = self.raw_file_size() as usize;
        len / BufferPool::get_page_size() - 1
    }

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

    pub fn write_empty_page_to_disk(&self, pid: &PageId) -> DbResult<()> {
        self.write_page_bytes(pid.page_index, &BasePage::empty_page_data())
    }
}

// root access
impl BTreeTable {
    pub fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        perm: Permission,
    ) -> ResultPod<BTreeRootPointerPage> {
        let pid = PageId::new(PageCategory::RootPointer, self.table_id, 0);
        Database::buffer_pool().get_root_ptr_page(tx, perm, &pid)
    }

    pub fn get_root_pid(&self, tx: &Transaction, perm: Permission) -> DbResult<PageId> {
        let root_ptr_rc = self.get_root_ptr_page(tx, perm)?;
        let root_pid = root_ptr_rc.rl().get_root_pid();
        Ok(root_pid)
    }

    pub fn set_root_pid(&self, tx: &Transaction, root_pid: &PageId) -> DbResult<()> {
        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadWrite)?;
        root_ptr_rc.wl().set_root_pid(root_pid);
        mark_dirty(tx, &root_ptr_rc);
        Ok(())
    }
}

// descent
impl BTreeTable {
    /// Find and lock the left-most leaf that may contain the search
    /// target, descending from `pid`. Every page on the path is locked
    /// with the requested permission.
    pub fn find_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: PageId,
        search: &SearchFor,
    ) -> ResultPod<BTreeLeafPage> {
        match pid.category {
            PageCategory::Leaf => Database::buffer_pool().get_leaf_page(tx, perm, &pid),
            PageCategory::Internal => {
                let page_rc = Database::buffer_pool().get_internal_page(tx, perm, &pid)?;

                let mut child_pid: Option<PageId> = None;
                // hold the internal page
                {
                    let page = page_rc.rl();
                    let mut last = None;
                    for e in page.iter() {
                        let go_left = match search {
                            SearchFor::Target(cell, op) => {
                                let key = e.get_key();
                                match op {
                                    Op::GreaterThan => key > *cell,
                                    _ => key >= *cell,
                                }
                            }
                            SearchFor::LeftMost => true,
                            SearchFor::RightMost => false,
                        };
                        if go_left {
                            child_pid = Some(e.get_left_child());
                            break;
                        }
                        last = Some(e);
                    }

                    if child_pid.is_none() {
                        // every separator was below the target; descend
                        // into the right-most child
                        match last {
                            Some(e) => child_pid = Some(e.get_right_child()),
                            None => {
                                return Err(DbError::InvalidPage(format!(
                                    "internal page {} has no entries",
                                    pid
                                )))
                            }
                        }
                    }
                }
                // release the internal page

                match child_pid {
                    Some(child_pid) => self.find_leaf_page(tx, perm, child_pid, search),
                    None => unreachable!(),
                }
            }
            _ => Err(DbError::InvalidPage(format!(
                "cannot descend through {}",
                pid
            ))),
        }
    }

    pub fn get_first_page(&self, tx: &Transaction, perm: Permission) -> ResultPod<BTreeLeafPage> {
        let root_pid = self.get_root_pid(tx, Permission::ReadOnly)?;
        self.find_leaf_page(tx, perm, root_pid, &SearchFor::LeftMost)
    }

    pub fn get_last_page(&self, tx: &Transaction, perm: Permission) -> ResultPod<BTreeLeafPage> {
        let root_pid = self.get_root_pid(tx, Permission::ReadOnly)?;
        self.find_leaf_page(tx, perm, root_pid, &SearchFor::RightMost)
    }

    pub(crate) fn set_parent(
        &self,
        tx: &Transaction,
        child_pid: &PageId,
        parent_pid: &PageId,
    ) -> DbResult<()> {
        match child_pid.category {
            PageCategory::Leaf => {
                let child_rc =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, child_pid)?;
                child_rc.wl().set_parent_pid(parent_pid);
                mark_dirty(tx, &child_rc);
            }
            PageCategory::Internal => {
                let child_rc = Database::buffer_pool().get_internal_page(
                    tx,
                    Permission::ReadWrite,
                    child_pid,
                )?;
                child_rc.wl().set_parent_pid(parent_pid);
                mark_dirty(tx, &child_rc);
            }
            _ => {
                return Err(DbError::InvalidPage(format!(
                    "{} cannot have a parent",
                    child_pid
                )))
            }
        }
        Ok(())
    }
}

// page allocation
impl BTreeTable {
    /// Index for a new page: a freed page from the header bitmap when
    /// one exists, otherwise the next index past the end of the file.
    pub fn get_empty_page_index(&self, tx: &Transaction) -> DbResult<u32> {
        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadOnly)?;
        let header_pid = root_ptr_rc.rl().get_header_pid();

        if let Some(header_pid) = header_pid {
            let header_rc =
                Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &header_pid)?;
            let slot = header_rc.rl().get_empty_slot();
            if let Some(slot) = slot {
                header_rc.wl().mark_slot_status(slot as usize, true);
                mark_dirty(tx, &header_rc);
                debug!("table {} reuses freed page {}", self.name, slot);
                return Ok(slot);
            }
        }

        Ok(self.page_index.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn get_empty_leaf_page(&self, tx: &Transaction) -> ResultPod<BTreeLeafPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageId::new(PageCategory::Leaf, self.table_id, page_index);
        self.write_empty_page_to_disk(&pid)?;

        let page_rc = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &pid)?;
        mark_dirty(tx, &page_rc);
        Ok(page_rc)
    }

    pub(crate) fn get_empty_internal_page(
        &self,
        tx: &Transaction,
    ) -> ResultPod<BTreeInternalPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageId::new(PageCategory::Internal, self.table_id, page_index);
        self.write_empty_page_to_disk(&pid)?;

        let page_rc = Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &pid)?;
        mark_dirty(tx, &page_rc);
        Ok(page_rc)
    }

    pub(crate) fn get_empty_header_page(&self, tx: &Transaction) -> ResultPod<BTreeHeaderPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageId::new(PageCategory::Header, self.table_id, page_index);
        self.write_empty_page_to_disk(&pid)?;

        let page_rc = Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &pid)?;
        // a fresh bitmap considers everything allocated until pages are
        // freed into it
        page_rc.wl().mark_all_used();
        mark_dirty(tx, &page_rc);
        Ok(page_rc)
    }

    /// Number of entries in the tree; walks every leaf.
    pub fn entries_count(&self, tx: &Transaction) -> usize {
        crate::btree::table_iter::BTreeTableIterator::new(tx, self).count()
    }
}

// validation walk, used by tests
impl BTreeTable {
    /// Assert structural invariants of the whole tree: parent pointers,
    /// key ordering against separator bounds, sibling links of the leaf
    /// chain, and (optionally) minimum occupancy.
    pub fn check_integrity(&self, tx: &Transaction, check_occupancy: bool) {
        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadOnly).unwrap();
        let root_pid = root_ptr_rc.rl().get_root_pid();
        let root_parent = root_ptr_rc.rl().get_pid();

        self.check_sub_tree(tx, &root_pid, &root_parent, &None, &None, check_occupancy, 0);
        self.check_leaf_chain(tx);
    }

    fn check_sub_tree(
        &self,
        tx: &Transaction,
        pid: &PageId,
        parent_pid: &PageId,
        lower: &Option<Cell>,
        upper: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) {
        match pid.category {
            PageCategory::Leaf => {
                let leaf_rc = Database::buffer_pool()
                    .get_leaf_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                leaf_rc
                    .rl()
                    .check_integrity(parent_pid, lower, upper, check_occupancy, depth);
            }
            PageCategory::Internal => {
                let page_rc = Database::buffer_pool()
                    .get_internal_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                let page = page_rc.rl();
                page.check_integrity(parent_pid, lower, upper, check_occupancy, depth);

                let mut child_lower = lower.clone();
                let mut last = None;
                for e in page.iter() {
                    self.check_sub_tree(
                        tx,
                        &e.get_left_child(),
                        pid,
                        &child_lower,
                        &Some(e.get_key()),
                        check_occupancy,
                        depth + 1,
                    );
                    child_lower = Some(e.get_key());
                    last = Some(e);
                }
                if let Some(e) = last {
                    self.check_sub_tree(
                        tx,
                        &e.get_right_child(),
                        pid,
                        &child_lower,
                        upper,
                        check_occupancy,
                        depth + 1,
                    );
                }
            }
            _ => panic!("unexpected page {} inside the tree", pid),
        }
    }

    /// The leaf sibling pointers form a doubly-linked list in
    /// non-decreasing key order.
    fn check_leaf_chain(&self, tx: &Transaction) {
        let mut page_rc = self.get_first_page(tx, Permission::ReadOnly).unwrap();
        assert_eq!(page_rc.rl().get_left_pid(), None);

        let mut previous_key: Option<Cell> = None;
        loop {
            let right_pid;
            // hold the current leaf
            {
                let page = page_rc.rl();
                for e in page.iter() {
                    if let Some(p) = &previous_key {
                        assert!(p <= &e.get_key(), "leaf chain out of order");
                    }
                    previous_key = Some(e.get_key());
                }
                right_pid = page.get_right_pid();
            }
            // release the current leaf

            match right_pid {
                Some(right_pid) => {
                    let right_rc = Database::buffer_pool()
                        .get_leaf_page(tx, Permission::ReadOnly, &right_pid)
                        .unwrap();
                    assert_eq!(
                        right_rc.rl().get_left_pid(),
                        Some(page_rc.rl().get_pid()),
                        "broken sibling back-link at {}",
                        right_pid
                    );
                    page_rc = right_rc;
                }
                None => break,
            }
        }
    }
}
