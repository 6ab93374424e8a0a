use bit_vec::BitVec;

use crate::{
    buffer_pool::BufferPool,
    io::{pack_bitmap, unpack_bitmap, ByteReader, ByteWriter},
    page::{BasePage, Page, PageCategory, PageId, EMPTY_PAGE_INDEX},
    utils::ceil_div,
};

/// Allocation bitmap of a B+ tree file: bit i set means page index i is
/// in use. Freed pages are cleared here and handed out again before the
/// file grows. Header pages chain through a next pointer.
pub struct BTreeHeaderPage {
    base: BasePage,

    next_header_index: u32,

    // true = allocated
    header: BitVec,

    slot_count: usize,
}

impl std::ops::Deref for BTreeHeaderPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeHeaderPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl BTreeHeaderPage {
    pub fn new(pid: &PageId, bytes: &[u8]) -> Self {
        let slot_count = Self::calculate_slots_count();

        let mut reader = ByteReader::new(bytes);
        let next_header_index = reader.read_u32();
        let header = unpack_bitmap(reader.read_bytes(ceil_div(slot_count, 8)), slot_count);

        Self {
            base: BasePage::new(pid),
            next_header_index,
            header,
            slot_count,
        }
    }

    /// Page indexes tracked per header page: everything after the next
    /// pointer is bitmap.
    pub fn calculate_slots_count() -> usize {
        (BufferPool::get_page_size() - 4) * 8
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    /// A fresh header page starts with every slot allocated; pages only
    /// become available here when they are explicitly freed.
    pub fn mark_all_used(&mut self) {
        for i in 0..self.slot_count {
            self.header.set(i, true);
        }
    }

    pub fn mark_slot_status(&mut self, slot: usize, used: bool) {
        self.header.set(slot, used);
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot]
    }

    /// The lowest freed page index, if any.
    pub fn get_empty_slot(&self) -> Option<u32> {
        for i in 0..self.slot_count {
            if !self.header[i] {
                return Some(i as u32);
            }
        }
        None
    }

    pub fn get_next_header_pid(&self) -> Option<PageId> {
        if self.next_header_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageId::new(
            PageCategory::Header,
            self.get_pid().table_id,
            self.next_header_index,
        ))
    }

    pub fn set_next_header_pid(&mut self, pid: &PageId) {
        self.next_header_index = pid.page_index;
    }
}

impl Page for BTreeHeaderPage {
    fn get_pid(&self) -> PageId {
        self.base.get_pid()
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u32(self.next_header_index);
        writer.write_bytes(&pack_bitmap(&self.header, ceil_div(self.slot_count, 8)));
        writer.to_padded_bytes(BufferPool::get_page_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_and_reuse_slot() {
        let pid = PageId::new(PageCategory::Header, 5, 2);
        let mut page = BTreeHeaderPage::new(&pid, &BasePage::empty_page_data());
        page.mark_all_used();

        assert_eq!(page.get_empty_slot(), None);

        page.mark_slot_status(4, false);
        page.mark_slot_status(9, false);
        assert_eq!(page.get_empty_slot(), Some(4));

        page.mark_slot_status(4, true);
        assert_eq!(page.get_empty_slot(), Some(9));
    }

    #[test]
    fn test_page_data_round_trip() {
        let pid = PageId::new(PageCategory::Header, 5, 2);
        let mut page = BTreeHeaderPage::new(&pid, &BasePage::empty_page_data());
        page.mark_all_used();
        page.mark_slot_status(17, false);

        let data = page.get_page_data();
        let reborn = BTreeHeaderPage::new(&pid, &data);
        assert_eq!(reborn.get_page_data(), data);
        assert_eq!(reborn.get_empty_slot(), Some(17));
    }
}
