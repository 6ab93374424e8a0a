use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use log::debug;

use crate::{
    btree::page::{BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreeRootPointerPage},
    catalog::Table,
    error::{DbError, DbResult},
    heap::HeapPage,
    page::{Page, PageCategory, PageId},
    storage::Tuple,
    transaction::{Permission, Transaction},
    types::{new_pod, Pod, ResultPod},
    utils::HandyRwLock,
    Database,
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_PAGES: usize = 50;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);
static CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_PAGES);

/// A cached page of any kind. Dispatches the shared page capability over
/// the concrete page types.
pub enum PagePod {
    Heap(Pod<HeapPage>),
    Leaf(Pod<BTreeLeafPage>),
    Internal(Pod<BTreeInternalPage>),
    RootPointer(Pod<BTreeRootPointerPage>),
    Header(Pod<BTreeHeaderPage>),
}

impl Clone for PagePod {
    fn clone(&self) -> Self {
        match self {
            PagePod::Heap(p) => PagePod::Heap(Pod::clone(p)),
            PagePod::Leaf(p) => PagePod::Leaf(Pod::clone(p)),
            PagePod::Internal(p) => PagePod::Internal(Pod::clone(p)),
            PagePod::RootPointer(p) => PagePod::RootPointer(Pod::clone(p)),
            PagePod::Header(p) => PagePod::Header(Pod::clone(p)),
        }
    }
}

impl PagePod {
    pub fn get_pid(&self) -> PageId {
        match self {
            PagePod::Heap(p) => p.rl().get_pid(),
            PagePod::Leaf(p) => p.rl().get_pid(),
            PagePod::Internal(p) => p.rl().get_pid(),
            PagePod::RootPointer(p) => p.rl().get_pid(),
            PagePod::Header(p) => p.rl().get_pid(),
        }
    }

    pub fn is_dirty(&self) -> Option<Transaction> {
        match self {
            PagePod::Heap(p) => p.rl().is_dirty(),
            PagePod::Leaf(p) => p.rl().is_dirty(),
            PagePod::Internal(p) => p.rl().is_dirty(),
            PagePod::RootPointer(p) => p.rl().is_dirty(),
            PagePod::Header(p) => p.rl().is_dirty(),
        }
    }

    pub fn set_dirty(&self, tx: Option<Transaction>) {
        match self {
            PagePod::Heap(p) => p.wl().set_dirty(tx),
            PagePod::Leaf(p) => p.wl().set_dirty(tx),
            PagePod::Internal(p) => p.wl().set_dirty(tx),
            PagePod::RootPointer(p) => p.wl().set_dirty(tx),
            PagePod::Header(p) => p.wl().set_dirty(tx),
        }
    }

    pub fn get_page_data(&self) -> Vec<u8> {
        match self {
            PagePod::Heap(p) => p.rl().get_page_data(),
            PagePod::Leaf(p) => p.rl().get_page_data(),
            PagePod::Internal(p) => p.rl().get_page_data(),
            PagePod::RootPointer(p) => p.rl().get_page_data(),
            PagePod::Header(p) => p.rl().get_page_data(),
        }
    }

    pub fn get_before_image(&self) -> Option<Vec<u8>> {
        match self {
            PagePod::Heap(p) => p.rl().get_before_image(),
            PagePod::Leaf(p) => p.rl().get_before_image(),
            PagePod::Internal(p) => p.rl().get_before_image(),
            PagePod::RootPointer(p) => p.rl().get_before_image(),
            PagePod::Header(p) => p.rl().get_before_image(),
        }
    }

    pub fn set_before_image(&self, bytes: &[u8]) {
        match self {
            PagePod::Heap(p) => p.wl().set_before_image(bytes),
            PagePod::Leaf(p) => p.wl().set_before_image(bytes),
            PagePod::Internal(p) => p.wl().set_before_image(bytes),
            PagePod::RootPointer(p) => p.wl().set_before_image(bytes),
            PagePod::Header(p) => p.wl().set_before_image(bytes),
        }
    }

    /// Non-blocking dirty probe for the eviction scan. `None` means the
    /// page is borrowed right now (possibly by the requesting thread
    /// itself) and must not be inspected, let alone evicted.
    fn try_is_dirty(&self) -> Option<Option<Transaction>> {
        match self {
            PagePod::Heap(p) => p.try_read().ok().map(|g| g.is_dirty()),
            PagePod::Leaf(p) => p.try_read().ok().map(|g| g.is_dirty()),
            PagePod::Internal(p) => p.try_read().ok().map(|g| g.is_dirty()),
            PagePod::RootPointer(p) => p.try_read().ok().map(|g| g.is_dirty()),
            PagePod::Header(p) => p.try_read().ok().map(|g| g.is_dirty()),
        }
    }
}

struct PoolInner {
    cache: HashMap<PageId, PagePod>,

    // page ids in insertion order, scanned front-first on eviction
    order: VecDeque<PageId>,

    // pages each live transaction has touched, in touch order
    undo: HashMap<Transaction, Vec<PageId>>,
}

/// Bounded page cache mediating all page access. Locks pages through the
/// lock manager, keeps before-images for undo, and follows a NO-STEAL
/// policy: dirty pages of uncommitted transactions never reach disk.
pub struct BufferPool {
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                cache: HashMap::new(),
                order: VecDeque::new(),
                undo: HashMap::new(),
            }),
        }
    }

    pub fn get_page_size() -> usize {
        PAGE_SIZE.load(Ordering::Relaxed)
    }

    // for tests only; live pages do not survive a size change
    pub fn set_page_size(page_size: usize) {
        PAGE_SIZE.store(page_size, Ordering::Relaxed);
    }

    pub fn reset_page_size() {
        PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::Relaxed);
    }

    pub fn get_capacity() -> usize {
        CAPACITY.load(Ordering::Relaxed)
    }

    pub fn set_capacity(pages: usize) {
        CAPACITY.store(pages, Ordering::Relaxed);
    }

    pub fn reset_capacity() {
        CAPACITY.store(DEFAULT_PAGES, Ordering::Relaxed);
    }

    fn lock_inner(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap()
    }

    pub fn get_heap_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<HeapPage> {
        match self.request_page(tx, perm, pid)? {
            PagePod::Heap(pod) => Ok(pod),
            _ => Err(DbError::InvalidPage(format!("{} is not a heap page", pid))),
        }
    }

    pub fn get_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeLeafPage> {
        match self.request_page(tx, perm, pid)? {
            PagePod::Leaf(pod) => Ok(pod),
            _ => Err(DbError::InvalidPage(format!("{} is not a leaf page", pid))),
        }
    }

    pub fn get_internal_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeInternalPage> {
        match self.request_page(tx, perm, pid)? {
            PagePod::Internal(pod) => Ok(pod),
            _ => Err(DbError::InvalidPage(format!(
                "{} is not an internal page",
                pid
            ))),
        }
    }

    pub fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeRootPointerPage> {
        match self.request_page(tx, perm, pid)? {
            PagePod::RootPointer(pod) => Ok(pod),
            _ => Err(DbError::InvalidPage(format!(
                "{} is not a root pointer page",
                pid
            ))),
        }
    }

    pub fn get_header_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeHeaderPage> {
        match self.request_page(tx, perm, pid)? {
            PagePod::Header(pod) => Ok(pod),
            _ => Err(DbError::InvalidPage(format!("{} is not a header page", pid))),
        }
    }

    /// Lock the page for the transaction, then serve it from the cache
    /// or load it from disk, evicting first when the pool is full. The
    /// first touch by a transaction captures the page's before-image and
    /// enrolls the page in the transaction's undo list.
    fn request_page(&self, tx: &Transaction, perm: Permission, pid: &PageId) -> DbResult<PagePod> {
        // the blocking wait happens before the pool mutex is taken, so a
        // stalled acquire never wedges the whole pool
        Database::lock_manager().acquire(tx, pid, &perm.to_lock())?;

        let mut inner = self.lock_inner();

        if let Some(pod) = inner.cache.get(pid).cloned() {
            Self::enroll_undo(&mut inner, tx, pid, &pod);
            return Ok(pod);
        }

        if inner.cache.len() >= Self::get_capacity() {
            Self::evict_page(&mut inner)?;
        }

        let table = Self::table_for(pid)?;
        let bytes = table.read_page_bytes(pid.page_index)?;
        let pod = Self::decode_page(pid, &bytes, &table)?;
        debug!("loaded {} from disk", pid);

        pod.set_before_image(&bytes);
        inner.cache.insert(*pid, pod.clone());
        inner.order.push_back(*pid);
        inner.undo.entry(*tx).or_default().push(*pid);
        Ok(pod)
    }

    fn enroll_undo(inner: &mut PoolInner, tx: &Transaction, pid: &PageId, pod: &PagePod) {
        let touched = inner.undo.entry(*tx).or_default();
        if !touched.contains(pid) {
            pod.set_before_image(&pod.get_page_data());
            touched.push(*pid);
        }
    }

    fn table_for(pid: &PageId) -> DbResult<Table> {
        // clone the handle out so no catalog guard is held during I/O
        let catalog = Database::catalog();
        catalog.get_table(pid.table_id)
    }

    fn decode_page(pid: &PageId, bytes: &[u8], table: &Table) -> DbResult<PagePod> {
        let pod = match pid.category {
            PageCategory::Heap => {
                PagePod::Heap(new_pod(HeapPage::new(pid, bytes, &table.get_scheme())))
            }
            PageCategory::Leaf => PagePod::Leaf(new_pod(BTreeLeafPage::new(
                pid,
                bytes,
                table.key_type()?,
            ))),
            PageCategory::Internal => PagePod::Internal(new_pod(BTreeInternalPage::new(
                pid,
                bytes,
                table.key_type()?,
            ))),
            PageCategory::RootPointer => {
                PagePod::RootPointer(new_pod(BTreeRootPointerPage::new(pid, bytes)))
            }
            PageCategory::Header => PagePod::Header(new_pod(BTreeHeaderPage::new(pid, bytes))),
        };
        Ok(pod)
    }

    /// Evict the oldest page that is clean and not exclusively locked.
    /// With every page dirty the pool is stuck: under NO-STEAL nothing
    /// may be written out early, so the request fails.
    fn evict_page(inner: &mut PoolInner) -> DbResult<()> {
        let victim = inner.order.iter().position(|pid| {
            let clean = match inner.cache.get(pid) {
                Some(pod) => matches!(pod.try_is_dirty(), Some(None)),
                None => true,
            };
            clean && !Database::lock_manager().has_writer(pid)
        });

        match victim {
            Some(pos) => {
                let pid = inner.order.remove(pos).unwrap();
                inner.cache.remove(&pid);
                debug!("evicted {}", pid);
                Ok(())
            }
            None => Err(DbError::BufferFull("no clean page to evict".to_string())),
        }
    }

    /// Insert on behalf of the transaction and mark every page the heap
    /// file dirtied.
    pub fn insert_tuple(&self, tx: &Transaction, table_id: u32, tuple: &Tuple) -> DbResult<()> {
        let table = {
            let catalog = Database::catalog();
            catalog.get_table(table_id)?
        };
        let heap = table.heap()?;
        let dirtied = heap.rl().insert_tuple(tx, tuple)?;
        self.mark_pages_dirty(tx, &dirtied);
        Ok(())
    }

    /// Delete the tuple its record id points at and mark the dirtied
    /// pages.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple
            .get_record_id()
            .ok_or_else(|| DbError::SlotEmpty("tuple has no record id".to_string()))?;
        let table = {
            let catalog = Database::catalog();
            catalog.get_table(rid.pid.table_id)?
        };
        let heap = table.heap()?;
        let dirtied = heap.rl().delete_tuple(tx, tuple)?;
        self.mark_pages_dirty(tx, &dirtied);
        Ok(())
    }

    fn mark_pages_dirty(&self, tx: &Transaction, pids: &[PageId]) {
        let inner = self.lock_inner();
        for pid in pids {
            if let Some(pod) = inner.cache.get(pid) {
                pod.set_dirty(Some(*tx));
            }
        }
    }

    /// Write every dirty page back through its file. Breaks NO-STEAL for
    /// uncommitted work, so this is only for orderly shutdown and tests.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let inner = self.lock_inner();
        for pid in inner.order.clone() {
            Self::flush_page_locked(&inner, &pid)?;
        }
        Ok(())
    }

    fn flush_page_locked(inner: &PoolInner, pid: &PageId) -> DbResult<()> {
        let pod = match inner.cache.get(pid) {
            Some(pod) => pod,
            None => return Ok(()),
        };
        if pod.is_dirty().is_none() {
            return Ok(());
        }

        let table = Self::table_for(pid)?;
        let data = pod.get_page_data();
        table.write_page_bytes(pid.page_index, &data)?;
        pod.set_dirty(None);
        // after a flush the on-disk state is the new rollback point
        pod.set_before_image(&data);
        debug!("flushed {}", pid);
        Ok(())
    }

    /// Flush the transaction's pages and clear its undo list.
    pub fn flush_pages(&self, tx: &Transaction) -> DbResult<()> {
        let mut inner = self.lock_inner();
        let pids = inner.undo.remove(tx).unwrap_or_default();
        for pid in pids {
            Self::flush_page_locked(&inner, &pid)?;
        }
        Ok(())
    }

    /// Commit or abort. On commit the transaction's dirty pages are
    /// forced to disk; on abort their before-images are written back and
    /// the cached copies replaced. Locks are released only after the
    /// page work is done.
    pub fn tx_complete(&self, tx: &Transaction, commit: bool) -> DbResult<()> {
        // hold the pool across the whole page pass so lock release below
        // is atomic with respect to it
        {
            let mut inner = self.lock_inner();
            let pids = inner.undo.remove(tx).unwrap_or_default();

            for pid in &pids {
                let pod = match inner.cache.get(pid).cloned() {
                    Some(pod) => pod,
                    None => continue,
                };

                if commit {
                    Self::flush_page_locked(&inner, pid)?;
                } else if pod.is_dirty().is_some() {
                    let image = pod.get_before_image().ok_or_else(|| {
                        DbError::InvalidPage(format!("{} has no before-image", pid))
                    })?;

                    let table = Self::table_for(pid)?;
                    table.write_page_bytes(pid.page_index, &image)?;

                    let restored = Self::decode_page(pid, &image, &table)?;
                    restored.set_before_image(&image);
                    inner.cache.insert(*pid, restored);
                    debug!("restored {} from its before-image", pid);
                }
            }
        }

        Database::lock_manager().release_all(tx);
        debug!("{} complete, commit: {}", tx, commit);
        Ok(())
    }

    /// Drop a page without flushing it. Used when a B+ tree returns a
    /// page to its free list.
    pub fn discard_page(&self, pid: &PageId) {
        let mut inner = self.lock_inner();
        inner.cache.remove(pid);
        inner.order.retain(|p| p != pid);
    }

    pub fn cached_pages_count(&self) -> usize {
        self.lock_inner().cache.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock_inner();
        inner.cache.clear();
        inner.order.clear();
        inner.undo.clear();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
