use bit_vec::BitVec;

use log::debug;

use crate::{
    btree::{
        entry::{IndexEntry, WrappedEntry},
        page::INDEX_SIZE,
    },
    buffer_pool::BufferPool,
    error::{DbError, DbResult},
    io::{pack_bitmap, unpack_bitmap, ByteReader, ByteWriter},
    page::{BasePage, Page, PageCategory, PageId, EMPTY_PAGE_INDEX},
    storage::{cell::Cell, schema::Type, tuple::RecordId},
    types::Pod,
    utils::ceil_div,
};

/// A leaf node: sorted `(key, record id)` entries plus sibling pointers
/// forming a doubly-linked list in key order.
pub struct BTreeLeafPage {
    base: BasePage,

    slot_count: usize,

    // slot status, true = occupied
    header: BitVec,

    // all slots, including empty ones
    entries: Vec<IndexEntry>,

    key_type: Type,

    // page indexes; EMPTY_PAGE_INDEX means no sibling
    left_sibling_index: u32,
    right_sibling_index: u32,
}

impl std::ops::Deref for BTreeLeafPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeLeafPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl BTreeLeafPage {
    pub fn new(pid: &PageId, bytes: &[u8], key_type: Type) -> Self {
        let slot_count = Self::calculate_slots_count(&key_type);
        let header_size = Self::calculate_header_size(slot_count);

        let mut reader = ByteReader::new(bytes);
        let parent_index = reader.read_u32();
        let left_sibling_index = reader.read_u32();
        let right_sibling_index = reader.read_u32();
        let header = unpack_bitmap(reader.read_bytes(header_size), slot_count);

        let mut entries = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let key = Cell::decode(&mut reader, &key_type);
            let page_index = reader.read_u32();
            let slot = reader.read_u32() as usize;
            let rid = RecordId::new(
                PageId::new(PageCategory::Heap, pid.table_id, page_index),
                slot,
            );
            entries.push(IndexEntry::new(&key, &rid));
        }

        let mut base = BasePage::new(pid);
        base.set_parent_pid(&PageId::new(
            PageCategory::Internal,
            pid.table_id,
            parent_index,
        ));

        Self {
            base,
            slot_count,
            header,
            entries,
            key_type,
            left_sibling_index,
            right_sibling_index,
        }
    }

    /// Maximum entries per leaf: an entry costs the key bytes, a record
    /// id, and one header bit; the three sibling/parent pointers are the
    /// fixed overhead.
    pub fn calculate_slots_count(key_type: &Type) -> usize {
        let entry_size = key_type.get_len() + 2 * INDEX_SIZE;
        let bits_per_entry = entry_size * 8 + 1;
        let extra_bits = 3 * INDEX_SIZE * 8;
        (BufferPool::get_page_size() * 8 - extra_bits) / bits_per_entry
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        ceil_div(slot_count, 8)
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot]
    }

    fn mark_slot_status(&mut self, slot: usize, used: bool) {
        self.header.set(slot, used);
    }

    pub fn empty_slots_count(&self) -> usize {
        (0..self.slot_count).filter(|i| !self.header[*i]).count()
    }

    pub fn entries_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    /// Minimum-occupancy check; the root is exempt.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.entries_count() >= ceil_div(self.slot_count, 2)
    }

    pub fn get_left_pid(&self) -> Option<PageId> {
        if self.left_sibling_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageId::new(
            PageCategory::Leaf,
            self.get_pid().table_id,
            self.left_sibling_index,
        ))
    }

    pub fn set_left_pid(&mut self, pid: Option<PageId>) {
        self.left_sibling_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }

    pub fn get_right_pid(&self) -> Option<PageId> {
        if self.right_sibling_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageId::new(
            PageCategory::Leaf,
            self.get_pid().table_id,
            self.right_sibling_index,
        ))
    }

    pub fn set_right_pid(&mut self, pid: Option<PageId>) {
        self.right_sibling_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }

    /// Add the entry keeping the slots sorted by key then record id.
    pub fn insert_entry(&mut self, entry: &IndexEntry) -> DbResult<()> {
        if self.empty_slots_count() == 0 {
            return Err(DbError::PageFull(format!("{}", self.get_pid())));
        }

        // first empty slot
        let mut first_empty_slot: i64 = 0;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                first_empty_slot = i as i64;
                break;
            }
        }

        // last slot holding an entry not greater than the new one; -1 when
        // the new entry sorts before everything
        let mut last_less_slot: i64 = -1;
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                if self.entries[i] <= *entry {
                    last_less_slot = i as i64;
                } else {
                    break;
                }
            }
        }

        // shift records towards the empty slot to open a gap next to the
        // insert position
        let good_slot: usize;
        if first_empty_slot < last_less_slot {
            for i in first_empty_slot..last_less_slot {
                self.move_entry((i + 1) as usize, i as usize);
            }
            good_slot = last_less_slot as usize;
        } else {
            for i in ((last_less_slot + 1)..first_empty_slot).rev() {
                self.move_entry(i as usize, (i + 1) as usize);
            }
            good_slot = (last_less_slot + 1) as usize;
        }

        self.entries[good_slot] = entry.clone();
        self.mark_slot_status(good_slot, true);

        debug!(
            "leaf {} insert at slot {}, first empty {}, last less {}",
            self.get_pid(),
            good_slot,
            first_empty_slot,
            last_less_slot
        );
        Ok(())
    }

    // destination must be empty
    fn move_entry(&mut self, from: usize, to: usize) {
        if !self.is_slot_used(from) || self.is_slot_used(to) {
            return;
        }
        self.entries[to] = self.entries[from].clone();
        self.mark_slot_status(to, true);
        self.mark_slot_status(from, false);
    }

    pub fn delete_entry(&mut self, slot: usize) {
        self.mark_slot_status(slot, false);
    }

    pub fn get_entry(&self, slot: usize) -> Option<IndexEntry> {
        if self.is_slot_used(slot) {
            return Some(self.entries[slot].clone());
        }
        None
    }

    pub fn iter(&self) -> BTreeLeafPageIterator {
        BTreeLeafPageIterator::new(self)
    }

    pub fn check_integrity(
        &self,
        parent_pid: &PageId,
        lower_bound: &Option<Cell>,
        upper_bound: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Leaf);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous: Option<WrappedEntry> = None;
        for e in self.iter() {
            if let Some(p) = &previous {
                assert!(
                    p.get_entry() <= e.get_entry(),
                    "leaf {} out of order: {} then {}",
                    self.get_pid(),
                    p,
                    e
                );
            }
            if let Some(lower) = lower_bound {
                assert!(lower <= &e.get_key());
            }
            if let Some(upper) = upper_bound {
                assert!(&e.get_key() <= upper);
            }
            previous = Some(e);
        }

        if check_occupancy && depth > 0 {
            assert!(self.entries_count() >= self.slot_count / 2);
        }
    }
}

impl Page for BTreeLeafPage {
    fn get_pid(&self) -> PageId {
        self.base.get_pid()
    }

    fn get_page_data(&self) -> Vec<u8> {
        let header_size = Self::calculate_header_size(self.slot_count);

        let mut writer = ByteWriter::new();
        writer.write_u32(self.get_parent_pid().page_index);
        writer.write_u32(self.left_sibling_index);
        writer.write_u32(self.right_sibling_index);
        writer.write_bytes(&pack_bitmap(&self.header, header_size));

        let entry_size = self.key_type.get_len() + 2 * INDEX_SIZE;
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                let e = &self.entries[i];
                e.get_key().encode(&mut writer, &self.key_type);
                writer.write_u32(e.get_rid().pid.page_index);
                writer.write_u32(e.get_rid().slot as u32);
            } else {
                writer.write_bytes(&vec![0; entry_size]);
            }
        }
        writer.to_padded_bytes(BufferPool::get_page_size())
    }
}

pub struct BTreeLeafPageIterator<'page> {
    page: &'page BTreeLeafPage,
    cursor: i64,
    reverse_cursor: i64,
}

impl<'page> BTreeLeafPageIterator<'page> {
    pub fn new(page: &'page BTreeLeafPage) -> Self {
        Self {
            page,
            cursor: -1,
            reverse_cursor: page.slot_count as i64,
        }
    }
}

impl Iterator for BTreeLeafPageIterator<'_> {
    type Item = WrappedEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.cursor += 1;
            if self.cursor >= self.reverse_cursor || self.cursor >= self.page.slot_count as i64 {
                return None;
            }

            let slot = self.cursor as usize;
            if self.page.is_slot_used(slot) {
                return Some(WrappedEntry::new(
                    &self.page.entries[slot],
                    slot,
                    self.page.get_pid(),
                ));
            }
        }
    }
}

impl DoubleEndedIterator for BTreeLeafPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor <= self.cursor || self.reverse_cursor < 0 {
                return None;
            }

            let slot = self.reverse_cursor as usize;
            if self.page.is_slot_used(slot) {
                return Some(WrappedEntry::new(
                    &self.page.entries[slot],
                    slot,
                    self.page.get_pid(),
                ));
            }
        }
    }
}

/// Iteration over a shared leaf handle from the buffer pool.
pub struct BTreeLeafPageIteratorRc {
    page: Pod<BTreeLeafPage>,
    cursor: i64,
    reverse_cursor: i64,
}

impl BTreeLeafPageIteratorRc {
    pub fn new(page: Pod<BTreeLeafPage>) -> Self {
        let slot_count = page.read().unwrap().get_slots_count();
        Self {
            page,
            cursor: -1,
            reverse_cursor: slot_count as i64,
        }
    }
}

impl Iterator for BTreeLeafPageIteratorRc {
    type Item = WrappedEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page.read().unwrap();
        loop {
            self.cursor += 1;
            if self.cursor >= self.reverse_cursor || self.cursor >= page.slot_count as i64 {
                return None;
            }

            let slot = self.cursor as usize;
            if page.is_slot_used(slot) {
                return Some(WrappedEntry::new(&page.entries[slot], slot, page.get_pid()));
            }
        }
    }
}

impl DoubleEndedIterator for BTreeLeafPageIteratorRc {
    fn next_back(&mut self) -> Option<Self::Item> {
        let page = self.page.read().unwrap();
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor <= self.cursor || self.reverse_cursor < 0 {
                return None;
            }

            let slot = self.reverse_cursor as usize;
            if page.is_slot_used(slot) {
                return Some(WrappedEntry::new(&page.entries[slot], slot, page.get_pid()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(table_id: u32, key: i32) -> IndexEntry {
        let rid = RecordId::new(PageId::new(PageCategory::Heap, table_id, 0), key as usize);
        IndexEntry::new(&Cell::Int(key), &rid)
    }

    fn empty_leaf() -> BTreeLeafPage {
        let pid = PageId::new(PageCategory::Leaf, 3, 1);
        BTreeLeafPage::new(&pid, &BasePage::empty_page_data(), Type::Int)
    }

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut page = empty_leaf();
        for key in [5, 1, 9, 3, 7, 3] {
            page.insert_entry(&entry(3, key)).unwrap();
        }

        let keys: Vec<i32> = page.iter().map(|e| e.get_key().get_int().unwrap()).collect();
        assert_eq!(keys, vec![1, 3, 3, 5, 7, 9]);
    }

    #[test]
    fn test_page_data_round_trip() {
        let mut page = empty_leaf();
        for key in [4, 2, 8, 6] {
            page.insert_entry(&entry(3, key)).unwrap();
        }
        page.set_right_pid(Some(PageId::new(PageCategory::Leaf, 3, 2)));

        let data = page.get_page_data();
        assert_eq!(data.len(), BufferPool::get_page_size());

        let reborn = BTreeLeafPage::new(&page.get_pid(), &data, Type::Int);
        assert_eq!(reborn.get_page_data(), data);
        assert_eq!(reborn.entries_count(), 4);
        assert_eq!(reborn.get_right_pid(), page.get_right_pid());
        assert_eq!(reborn.get_left_pid(), None);
    }

    #[test]
    fn test_reverse_iterator_meets_forward() {
        let mut page = empty_leaf();
        for key in 0..10 {
            page.insert_entry(&entry(3, key)).unwrap();
        }

        let mut it = page.iter();
        assert_eq!(it.next().unwrap().get_key(), Cell::Int(0));
        assert_eq!(it.next_back().unwrap().get_key(), Cell::Int(9));
        assert_eq!(it.count(), 8);
    }
}
