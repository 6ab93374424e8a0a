use crate::{
    buffer_pool::BufferPool,
    page::{PageCategory, PageId, EMPTY_PAGE_INDEX},
    transaction::Transaction,
};

/// The capability every concrete page implements on top of [`BasePage`].
pub trait Page {
    fn get_pid(&self) -> PageId;

    /// Serialize to exactly one page worth of bytes. Unused payload bytes
    /// are zero.
    fn get_page_data(&self) -> Vec<u8>;
}

/// State common to all page kinds: identity, the dirty flag with its
/// owning transaction, the undo before-image, and (for B+ tree pages)
/// the parent pointer.
pub struct BasePage {
    pid: PageId,

    dirty_by: Option<Transaction>,

    /// Byte image captured when the current transaction first observed
    /// this page; written back on abort.
    before_image: Option<Vec<u8>>,

    parent_page_index: u32,
}

impl BasePage {
    pub fn new(pid: &PageId) -> Self {
        Self {
            pid: *pid,
            dirty_by: None,
            before_image: None,
            parent_page_index: EMPTY_PAGE_INDEX,
        }
    }

    pub fn get_pid(&self) -> PageId {
        self.pid
    }

    /// The transaction that dirtied this page, if any.
    pub fn is_dirty(&self) -> Option<Transaction> {
        self.dirty_by
    }

    pub fn set_dirty(&mut self, tx: Option<Transaction>) {
        self.dirty_by = tx;
    }

    pub fn get_before_image(&self) -> Option<Vec<u8>> {
        self.before_image.clone()
    }

    pub fn set_before_image(&mut self, bytes: &[u8]) {
        self.before_image = Some(bytes.to_vec());
    }

    /// Parent of a B+ tree page. Index 0 means the parent is the root
    /// pointer page, i.e. this page is the root.
    pub fn get_parent_pid(&self) -> PageId {
        let category = if self.parent_page_index == EMPTY_PAGE_INDEX {
            PageCategory::RootPointer
        } else {
            PageCategory::Internal
        };
        PageId::new(category, self.pid.table_id, self.parent_page_index)
    }

    pub fn set_parent_pid(&mut self, pid: &PageId) {
        self.parent_page_index = pid.page_index;
    }

    pub fn empty_page_data() -> Vec<u8> {
        vec![0; BufferPool::get_page_size()]
    }
}
