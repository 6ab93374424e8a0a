use crate::{
    buffer_pool::BufferPool,
    io::{ByteReader, ByteWriter},
    page::{BasePage, Page, PageCategory, PageId, EMPTY_PAGE_INDEX},
};

/// Page 0 of every B+ tree file: the location and kind of the root node
/// plus the head of the free-page list (the first header page).
pub struct BTreeRootPointerPage {
    base: BasePage,

    // Always present; a fresh file points at the empty leaf on page 1.
    root_pid: PageId,

    header_page_index: u32,
}

impl std::ops::Deref for BTreeRootPointerPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeRootPointerPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl BTreeRootPointerPage {
    pub fn new(pid: &PageId, bytes: &[u8]) -> Self {
        let mut reader = ByteReader::new(bytes);
        let root_page_index = reader.read_u32();
        let root_category = PageCategory::from_byte(reader.read_u8());
        let header_page_index = reader.read_u32();

        let root_pid = PageId::new(root_category, pid.table_id, root_page_index);
        Self {
            base: BasePage::new(pid),
            root_pid,
            header_page_index,
        }
    }

    /// The initial image of a fresh file: the root is the empty leaf at
    /// page index 1, no header pages yet.
    pub fn init_page_data() -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u32(1);
        writer.write_u8(PageCategory::Leaf.to_byte());
        writer.write_u32(EMPTY_PAGE_INDEX);
        writer.to_padded_bytes(BufferPool::get_page_size())
    }

    pub fn get_root_pid(&self) -> PageId {
        self.root_pid
    }

    pub fn set_root_pid(&mut self, pid: &PageId) {
        self.root_pid = *pid;
    }

    /// The first header page, if any was ever allocated.
    pub fn get_header_pid(&self) -> Option<PageId> {
        if self.header_page_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageId::new(
            PageCategory::Header,
            self.get_pid().table_id,
            self.header_page_index,
        ))
    }

    pub fn set_header_pid(&mut self, pid: &PageId) {
        self.header_page_index = pid.page_index;
    }
}

impl Page for BTreeRootPointerPage {
    fn get_pid(&self) -> PageId {
        self.base.get_pid()
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u32(self.root_pid.page_index);
        writer.write_u8(self.root_pid.category.to_byte());
        writer.write_u32(self.header_page_index);
        writer.to_padded_bytes(BufferPool::get_page_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_data_round_trip() {
        let pid = PageId::new(PageCategory::RootPointer, 5, 0);
        let page = BTreeRootPointerPage::new(&pid, &BTreeRootPointerPage::init_page_data());

        assert_eq!(page.get_root_pid(), PageId::new(PageCategory::Leaf, 5, 1));
        assert_eq!(page.get_header_pid(), None);
        assert_eq!(page.get_page_data(), BTreeRootPointerPage::init_page_data());
    }

    #[test]
    fn test_set_root_and_header() {
        let pid = PageId::new(PageCategory::RootPointer, 5, 0);
        let mut page = BTreeRootPointerPage::new(&pid, &BTreeRootPointerPage::init_page_data());

        page.set_root_pid(&PageId::new(PageCategory::Internal, 5, 3));
        page.set_header_pid(&PageId::new(PageCategory::Header, 5, 7));

        let reborn = BTreeRootPointerPage::new(&pid, &page.get_page_data());
        assert_eq!(reborn.get_root_pid(), PageId::new(PageCategory::Internal, 5, 3));
        assert_eq!(
            reborn.get_header_pid(),
            Some(PageId::new(PageCategory::Header, 5, 7))
        );
    }
}
