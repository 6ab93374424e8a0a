use std::fmt;

use bit_vec::BitVec;

use crate::{
    btree::page::INDEX_SIZE,
    buffer_pool::BufferPool,
    error::{DbError, DbResult},
    io::{pack_bitmap, unpack_bitmap, ByteReader, ByteWriter},
    page::{BasePage, Page, PageCategory, PageId},
    storage::{cell::Cell, schema::Type},
    utils::ceil_div,
};

/// An internal node: `m` separator keys and `m+1` child pointers.
///
/// Slot 0 never holds a key; its child pointer is the leftmost child.
/// The left child of the entry in slot `i` is the child of the nearest
/// *used* slot below `i`, which is why holes between used slots are
/// tolerated.
pub struct BTreeInternalPage {
    base: BasePage,

    keys: Vec<Cell>,

    children: Vec<u32>,

    child_category: PageCategory,

    slot_count: usize,

    header: BitVec,

    key_type: Type,
}

impl std::ops::Deref for BTreeInternalPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeInternalPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

fn zero_cell(t: &Type) -> Cell {
    match t {
        Type::Int => Cell::Int(0),
        Type::Char(_) => Cell::String(String::new()),
    }
}

impl BTreeInternalPage {
    pub fn new(pid: &PageId, bytes: &[u8], key_type: Type) -> Self {
        let max_entries = Self::get_max_entries(&key_type);
        let slot_count = max_entries + 1;
        let header_size = Self::get_header_size(slot_count);

        let mut reader = ByteReader::new(bytes);
        let parent_index = reader.read_u32();
        let child_category = PageCategory::from_byte(reader.read_u8());
        let header = unpack_bitmap(reader.read_bytes(header_size), slot_count);

        let mut keys = vec![zero_cell(&key_type)];
        for _ in 1..slot_count {
            keys.push(Cell::decode(&mut reader, &key_type));
        }
        let mut children = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            children.push(reader.read_u32());
        }

        let mut base = BasePage::new(pid);
        base.set_parent_pid(&PageId::new(
            PageCategory::Internal,
            pid.table_id,
            parent_index,
        ));

        Self {
            base,
            keys,
            children,
            child_category,
            slot_count,
            header,
            key_type,
        }
    }

    /// Maximum number of separator keys. An entry costs the key bytes,
    /// one child pointer and one header bit; the parent pointer, the
    /// child-kind byte and the extra (m+1)-th child pointer are overhead.
    pub fn get_max_entries(key_type: &Type) -> usize {
        let bits_per_entry = (key_type.get_len() + INDEX_SIZE) * 8 + 1;
        let extra_bits = 2 * INDEX_SIZE * 8 + 8;
        (BufferPool::get_page_size() * 8 - extra_bits) / bits_per_entry
    }

    fn get_header_size(slot_count: usize) -> usize {
        ceil_div(slot_count, 8)
    }

    pub fn get_entries_capacity(&self) -> usize {
        self.slot_count - 1
    }

    /// Capacity in children, one more than the key capacity.
    pub fn get_children_capacity(&self) -> usize {
        self.slot_count
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot]
    }

    fn mark_slot_status(&mut self, slot: usize, used: bool) {
        self.header.set(slot, used);
    }

    // slot 0 carries no key, so it is not counted here
    pub fn empty_slots_count(&self) -> usize {
        (1..self.slot_count).filter(|i| !self.header[*i]).count()
    }

    pub fn entries_count(&self) -> usize {
        self.slot_count - 1 - self.empty_slots_count()
    }

    pub fn children_count(&self) -> usize {
        self.entries_count() + 1
    }

    pub fn get_child_category(&self) -> PageCategory {
        self.child_category
    }

    /// Minimum-occupancy check; the root is exempt.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.entries_count() >= ceil_div(self.get_entries_capacity(), 2)
    }

    fn child_pid(&self, slot: usize) -> PageId {
        PageId::new(
            self.child_category,
            self.get_pid().table_id,
            self.children[slot],
        )
    }

    pub fn get_entry(&self, slot: usize) -> Option<Entry> {
        if slot == 0 || !self.is_slot_used(slot) {
            return None;
        }
        for left in (0..slot).rev() {
            if self.is_slot_used(left) {
                let mut e = Entry::new(
                    &self.keys[slot],
                    &self.child_pid(left),
                    &self.child_pid(slot),
                );
                e.set_record_id(slot);
                return Some(e);
            }
        }
        None
    }

    /// The entry joining the two given children, if any.
    pub fn get_entry_by_children(&self, left_pid: &PageId, right_pid: &PageId) -> Option<Entry> {
        self.iter()
            .find(|e| e.get_left_child() == *left_pid && e.get_right_child() == *right_pid)
    }

    pub fn get_first_child_pid(&self) -> PageId {
        let mut it = self.iter();
        it.next().unwrap().get_left_child()
    }

    pub fn get_last_child_pid(&self) -> PageId {
        let mut it = self.iter();
        it.next_back().unwrap().get_right_child()
    }

    /// Insert a separator entry, keeping keys sorted. The entry must
    /// share a child with an entry already present (or the page must be
    /// empty), since an internal node describes a contiguous run of
    /// children.
    pub fn insert_entry(&mut self, e: &Entry) -> DbResult<()> {
        if self.empty_slots_count() == 0 {
            return Err(DbError::PageFull(format!("{}", self.get_pid())));
        }

        self.child_category = e.get_left_child().category;

        // the very first entry fills the two base slots
        if self.entries_count() == 0 {
            self.children[0] = e.get_left_child().page_index;
            self.children[1] = e.get_right_child().page_index;
            self.keys[1] = e.get_key();
            self.mark_slot_status(0, true);
            self.mark_slot_status(1, true);
            return Ok(());
        }

        // first empty slot, starting from 1
        let mut empty_slot = 0;
        for i in 1..self.slot_count {
            if !self.is_slot_used(i) {
                empty_slot = i;
                break;
            }
        }

        // find the used slot whose child pointer matches the new entry
        let mut slot_just_ahead = usize::MAX;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                continue;
            }

            // the new entry goes right after the current one
            if self.children[i] == e.get_left_child().page_index {
                slot_just_ahead = i;
                break;
            }

            // the new entry splits the current one, whose right child
            // becomes the new entry's left child
            if self.children[i] == e.get_right_child().page_index {
                slot_just_ahead = i;
                self.children[i] = e.get_left_child().page_index;
                break;
            }
        }

        if slot_just_ahead == usize::MAX {
            return Err(DbError::InvalidPage(format!(
                "no adjacent child found for entry {} in {}",
                e,
                self.get_pid()
            )));
        }

        // shift entries towards the empty slot to open a gap
        let good_slot: usize;
        if empty_slot < slot_just_ahead {
            for i in empty_slot..slot_just_ahead {
                self.move_entry(i + 1, i);
            }
            good_slot = slot_just_ahead;
        } else {
            for i in ((slot_just_ahead + 1)..empty_slot).rev() {
                self.move_entry(i, i + 1);
            }
            good_slot = slot_just_ahead + 1;
        }

        self.keys[good_slot] = e.get_key();
        self.children[good_slot] = e.get_right_child().page_index;
        self.mark_slot_status(good_slot, true);
        Ok(())
    }

    fn move_entry(&mut self, from: usize, to: usize) {
        if self.is_slot_used(from) && !self.is_slot_used(to) {
            self.keys[to] = self.keys[from].clone();
            // the left child pointer stays untouched: it belongs to the
            // nearest used slot below, not to this one
            self.children[to] = self.children[from];
            self.mark_slot_status(from, false);
            self.mark_slot_status(to, true);
        }
    }

    /// Remove the key at the entry's slot together with its right child
    /// pointer.
    pub fn delete_key_and_right_child(&mut self, record_id: usize) {
        self.mark_slot_status(record_id, false);
    }

    /// Remove the key at the entry's slot together with its left child
    /// pointer; the right child takes the left child's place.
    pub fn delete_key_and_left_child(&mut self, record_id: usize) {
        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                self.children[i] = self.children[record_id];
                self.mark_slot_status(record_id, false);
                return;
            }
        }
    }

    /// Rewrite the key and child pointers at the entry's slot.
    pub fn update_entry(&mut self, entry: &Entry) {
        let record_id = entry.get_record_id();
        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                self.children[i] = entry.get_left_child().page_index;
                break;
            }
        }
        self.children[record_id] = entry.get_right_child().page_index;
        self.keys[record_id] = entry.get_key();
    }

    pub fn iter(&self) -> BTreeInternalPageIterator {
        BTreeInternalPageIterator::new(self)
    }

    pub fn check_integrity(
        &self,
        parent_pid: &PageId,
        lower_bound: &Option<Cell>,
        upper_bound: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Internal);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous = lower_bound.clone();
        for e in self.iter() {
            if let Some(p) = &previous {
                assert!(
                    p <= &e.get_key(),
                    "internal {} out of order: {} then {}",
                    self.get_pid(),
                    p,
                    e
                );
            }
            previous = Some(e.get_key());
        }

        if let (Some(p), Some(upper)) = (&previous, upper_bound) {
            assert!(p <= upper);
        }

        if check_occupancy && depth > 0 {
            // the page may dip one entry below half occupancy while a
            // rebalance is in flight
            assert!(self.entries_count() >= self.get_entries_capacity() / 2 - 1);
        }
    }
}

impl Page for BTreeInternalPage {
    fn get_pid(&self) -> PageId {
        self.base.get_pid()
    }

    fn get_page_data(&self) -> Vec<u8> {
        let header_size = Self::get_header_size(self.slot_count);

        let mut writer = ByteWriter::new();
        writer.write_u32(self.get_parent_pid().page_index);
        writer.write_u8(self.child_category.to_byte());
        writer.write_bytes(&pack_bitmap(&self.header, header_size));

        let key_len = self.key_type.get_len();
        for i in 1..self.slot_count {
            if self.is_slot_used(i) {
                self.keys[i].encode(&mut writer, &self.key_type);
            } else {
                writer.write_bytes(&vec![0; key_len]);
            }
        }
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                writer.write_u32(self.children[i]);
            } else {
                writer.write_u32(0);
            }
        }
        writer.to_padded_bytes(BufferPool::get_page_size())
    }
}

/// A separator key together with its two adjacent child pointers, plus
/// the slot it was read from.
#[derive(Clone)]
pub struct Entry {
    key: Cell,
    left: PageId,
    right: PageId,

    record_id: usize,
}

impl Entry {
    pub fn new(key: &Cell, left: &PageId, right: &PageId) -> Self {
        Self {
            key: key.clone(),
            left: *left,
            right: *right,
            record_id: 0,
        }
    }

    pub fn get_key(&self) -> Cell {
        self.key.clone()
    }

    pub fn set_key(&mut self, key: &Cell) {
        self.key = key.clone();
    }

    pub fn get_left_child(&self) -> PageId {
        self.left
    }

    pub fn get_right_child(&self) -> PageId {
        self.right
    }

    pub fn get_record_id(&self) -> usize {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: usize) {
        self.record_id = record_id;
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.key, self.left, self.right)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

pub struct BTreeInternalPageIterator<'page> {
    page: &'page BTreeInternalPage,

    cursor: usize,
    left_child_position: usize,

    reverse_cursor: usize,
    right_child_position: usize,
}

impl<'page> BTreeInternalPageIterator<'page> {
    pub fn new(page: &'page BTreeInternalPage) -> Self {
        let mut right_child_position = page.slot_count;
        loop {
            right_child_position -= 1;
            if right_child_position == 0 || page.is_slot_used(right_child_position) {
                break;
            }
        }

        Self {
            page,
            cursor: 0,
            left_child_position: 0,
            reverse_cursor: right_child_position,
            right_child_position,
        }
    }
}

impl Iterator for BTreeInternalPageIterator<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.cursor += 1;
            let cursor = self.cursor;
            if cursor >= self.page.slot_count {
                return None;
            }
            if !self.page.is_slot_used(cursor) {
                continue;
            }

            let mut e = Entry::new(
                &self.page.keys[cursor],
                &self.page.child_pid(self.left_child_position),
                &self.page.child_pid(cursor),
            );
            e.set_record_id(cursor);

            self.left_child_position = cursor;
            return Some(e);
        }
    }
}

impl DoubleEndedIterator for BTreeInternalPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            let left_index = match self.reverse_cursor.checked_sub(1) {
                Some(i) => i,
                None => return None,
            };
            self.reverse_cursor = left_index;
            if self.right_child_position == 0 {
                return None;
            }
            if !self.page.is_slot_used(left_index) && left_index != 0 {
                continue;
            }

            let mut e = Entry::new(
                &self.page.keys[self.right_child_position],
                &self.page.child_pid(left_index),
                &self.page.child_pid(self.right_child_position),
            );
            e.set_record_id(self.right_child_position);

            self.right_child_position = left_index;
            return Some(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_pid(table_id: u32, index: u32) -> PageId {
        PageId::new(PageCategory::Leaf, table_id, index)
    }

    fn empty_internal() -> BTreeInternalPage {
        let pid = PageId::new(PageCategory::Internal, 9, 4);
        BTreeInternalPage::new(&pid, &BasePage::empty_page_data(), Type::Int)
    }

    #[test]
    fn test_insert_entries_in_order() {
        let mut page = empty_internal();

        let e1 = Entry::new(&Cell::Int(10), &leaf_pid(9, 1), &leaf_pid(9, 2));
        page.insert_entry(&e1).unwrap();
        let e2 = Entry::new(&Cell::Int(20), &leaf_pid(9, 2), &leaf_pid(9, 3));
        page.insert_entry(&e2).unwrap();
        // splits the (10, p1, p2) range on the left
        let e3 = Entry::new(&Cell::Int(5), &leaf_pid(9, 1), &leaf_pid(9, 4));
        page.insert_entry(&e3).unwrap();

        let keys: Vec<i32> = page.iter().map(|e| e.get_key().get_int().unwrap()).collect();
        assert_eq!(keys, vec![5, 10, 20]);
        assert_eq!(page.children_count(), 4);
        assert_eq!(page.get_first_child_pid(), leaf_pid(9, 1));
        assert_eq!(page.get_last_child_pid(), leaf_pid(9, 3));
    }

    #[test]
    fn test_entry_children_chain() {
        let mut page = empty_internal();
        for i in 0..4 {
            let e = Entry::new(
                &Cell::Int((i as i32 + 1) * 10),
                &leaf_pid(9, i + 1),
                &leaf_pid(9, i + 2),
            );
            page.insert_entry(&e).unwrap();
        }

        let entries: Vec<Entry> = page.iter().collect();
        for pair in entries.windows(2) {
            assert_eq!(pair[0].get_right_child(), pair[1].get_left_child());
        }
    }

    #[test]
    fn test_page_data_round_trip() {
        let mut page = empty_internal();
        for i in 0..5 {
            let e = Entry::new(
                &Cell::Int((i as i32 + 1) * 7),
                &leaf_pid(9, i + 1),
                &leaf_pid(9, i + 2),
            );
            page.insert_entry(&e).unwrap();
        }

        let data = page.get_page_data();
        assert_eq!(data.len(), BufferPool::get_page_size());

        let reborn = BTreeInternalPage::new(&page.get_pid(), &data, Type::Int);
        assert_eq!(reborn.get_page_data(), data);
        assert_eq!(reborn.entries_count(), 5);
        assert_eq!(reborn.get_child_category(), PageCategory::Leaf);
    }

    #[test]
    fn test_reverse_iterator() {
        let mut page = empty_internal();
        for i in 0..3 {
            let e = Entry::new(
                &Cell::Int((i as i32 + 1) * 10),
                &leaf_pid(9, i + 1),
                &leaf_pid(9, i + 2),
            );
            page.insert_entry(&e).unwrap();
        }

        let mut it = page.iter();
        let last = it.next_back().unwrap();
        assert_eq!(last.get_key(), Cell::Int(30));
        assert_eq!(last.get_right_child(), leaf_pid(9, 4));
        assert_eq!(it.next_back().unwrap().get_key(), Cell::Int(20));
        assert_eq!(it.next_back().unwrap().get_key(), Cell::Int(10));
        assert!(it.next_back().is_none());
    }
}
