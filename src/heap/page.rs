use bit_vec::BitVec;

use crate::{
    buffer_pool::BufferPool,
    error::{DbError, DbResult},
    io::{pack_bitmap, unpack_bitmap, ByteReader, ByteWriter},
    page::{BasePage, Page, PageId},
    storage::{RecordId, Schema, Tuple},
    types::Pod,
    utils::ceil_div,
};

/// A slotted heap page: an occupancy bitmap followed by fixed-size tuple
/// slots. Deletes just clear the slot bit; no compaction happens.
pub struct HeapPage {
    base: BasePage,

    scheme: Schema,

    slot_count: usize,

    // slot status, true = occupied
    header: BitVec,

    // one entry per slot, including empty slots
    tuples: Vec<Tuple>,
}

impl std::ops::Deref for HeapPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for HeapPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl HeapPage {
    pub fn new(pid: &PageId, bytes: &[u8], scheme: &Schema) -> Self {
        let slot_count = Self::calculate_slots_count(scheme);
        let header_size = Self::calculate_header_size(slot_count);

        let header = unpack_bitmap(&bytes[..header_size], slot_count);

        let tuple_size = scheme.get_size();
        let mut tuples = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let start = header_size + i * tuple_size;
            let mut reader = ByteReader::new(&bytes[start..start + tuple_size]);
            let mut tuple = Tuple::decode(&mut reader, scheme);
            if header[i] {
                tuple.set_record_id(Some(RecordId::new(*pid, i)));
            }
            tuples.push(tuple);
        }

        Self {
            base: BasePage::new(pid),
            scheme: scheme.clone(),
            slot_count,
            header,
            tuples,
        }
    }

    /// How many tuples a page can hold: one slot costs the tuple bytes
    /// plus one header bit.
    pub fn calculate_slots_count(scheme: &Schema) -> usize {
        let bits_per_tuple = scheme.get_size() * 8 + 1;
        BufferPool::get_page_size() * 8 / bits_per_tuple
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

    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    /// Place the tuple into the lowest empty slot and stamp its record id.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> DbResult<RecordId> {
        if tuple.get_scheme() != &self.scheme {
            return Err(DbError::SchemaMismatch(format!(
                "tuple {} does not fit page {}",
                tuple,
                self.get_pid()
            )));
        }

        let slot = (0..self.slot_count)
            .find(|i| !self.header[*i])
            .ok_or_else(|| DbError::PageFull(format!("{}", self.get_pid())))?;

        let rid = RecordId::new(self.get_pid(), slot);
        let mut stored = tuple.clone();
        stored.set_record_id(Some(rid));
        self.tuples[slot] = stored;
        self.mark_slot_status(slot, true);
        Ok(rid)
    }

    /// Clear the slot referenced by the tuple's record id and detach the
    /// tuple from the page.
    pub fn delete_tuple(&mut self, tuple: &mut Tuple) -> DbResult<()> {
        let rid = tuple
            .get_record_id()
            .ok_or_else(|| DbError::SlotEmpty("tuple has no record id".to_string()))?;

        if rid.pid != self.get_pid() {
            return Err(DbError::SlotEmpty(format!(
                "record id {} does not reference page {}",
                rid,
                self.get_pid()
            )));
        }
        if rid.slot >= self.slot_count || !self.is_slot_used(rid.slot) {
            return Err(DbError::SlotEmpty(format!("{}", rid)));
        }

        self.mark_slot_status(rid.slot, false);
        tuple.set_record_id(None);
        Ok(())
    }

    pub fn get_tuple(&self, slot: usize) -> Option<Tuple> {
        if self.is_slot_used(slot) {
            return Some(self.tuples[slot].clone());
        }
        None
    }

    pub fn iter(&self) -> HeapPageIterator {
        HeapPageIterator::new(self)
    }
}

impl Page for HeapPage {
    fn get_pid(&self) -> PageId {
        self.base.get_pid()
    }

    fn get_page_data(&self) -> Vec<u8> {
        let header_size = Self::calculate_header_size(self.slot_count);
        let tuple_size = self.scheme.get_size();

        let mut writer = ByteWriter::new();
        writer.write_bytes(&pack_bitmap(&self.header, header_size));
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                self.tuples[i].encode(&mut writer);
            } else {
                writer.write_bytes(&vec![0; tuple_size]);
            }
        }
        writer.to_padded_bytes(BufferPool::get_page_size())
    }
}

/// Slot-ascending tuple iterator over a borrowed page.
pub struct HeapPageIterator<'page> {
    page: &'page HeapPage,
    cursor: usize,
}

impl<'page> HeapPageIterator<'page> {
    pub fn new(page: &'page HeapPage) -> Self {
        Self { page, cursor: 0 }
    }
}

impl Iterator for HeapPageIterator<'_> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.page.slot_count {
            let slot = self.cursor;
            self.cursor += 1;
            if self.page.is_slot_used(slot) {
                return Some(self.page.tuples[slot].clone());
            }
        }
        None
    }
}

/// Same iteration over a shared page handle from the buffer pool.
pub struct HeapPageIteratorRc {
    page: Pod<HeapPage>,
    cursor: usize,
}

impl HeapPageIteratorRc {
    pub fn new(page: Pod<HeapPage>) -> Self {
        Self { page, cursor: 0 }
    }
}

impl Iterator for HeapPageIteratorRc {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page.read().unwrap();
        while self.cursor < page.slot_count {
            let slot = self.cursor;
            self.cursor += 1;
            if page.is_slot_used(slot) {
                return Some(page.tuples[slot].clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{page::PageCategory, utils::small_int_schema};

    fn empty_page(scheme: &Schema) -> HeapPage {
        let pid = PageId::new(PageCategory::Heap, 7, 0);
        HeapPage::new(&pid, &BasePage::empty_page_data(), scheme)
    }

    #[test]
    fn test_capacity_formula() {
        let scheme = small_int_schema(2, "");
        let count = HeapPage::calculate_slots_count(&scheme);
        assert_eq!(count, BufferPool::get_page_size() * 8 / (8 * 8 + 1));
    }

    #[test]
    fn test_insert_until_full() {
        let scheme = small_int_schema(2, "");
        let mut page = empty_page(&scheme);
        let capacity = page.get_slots_count();

        for i in 0..capacity {
            let rid = page.insert_tuple(&Tuple::new_int_tuple(i as i32, 2)).unwrap();
            assert_eq!(rid.slot, i);
        }
        assert_eq!(page.tuples_count(), capacity);

        let err = page.insert_tuple(&Tuple::new_int_tuple(0, 2));
        assert!(matches!(err, Err(DbError::PageFull(_))));
    }

    #[test]
    fn test_header_bits_match_iterator() {
        let scheme = small_int_schema(2, "");
        let mut page = empty_page(&scheme);

        for i in 0..10 {
            page.insert_tuple(&Tuple::new_int_tuple(i, 2)).unwrap();
        }
        let mut third = page.get_tuple(3).unwrap();
        page.delete_tuple(&mut third).unwrap();

        let used = (0..page.get_slots_count())
            .filter(|i| page.is_slot_used(*i))
            .count();
        assert_eq!(used, page.iter().count());
        assert_eq!(used, 9);
    }

    #[test]
    fn test_delete_validates_record_id() {
        let scheme = small_int_schema(2, "");
        let mut page = empty_page(&scheme);

        // transient tuple, no record id
        let mut t = Tuple::new_int_tuple(1, 2);
        assert!(matches!(page.delete_tuple(&mut t), Err(DbError::SlotEmpty(_))));

        // record id pointing at another page
        let other_pid = PageId::new(PageCategory::Heap, 7, 5);
        t.set_record_id(Some(RecordId::new(other_pid, 0)));
        assert!(matches!(page.delete_tuple(&mut t), Err(DbError::SlotEmpty(_))));

        // deleting twice hits an empty slot
        let inserted_slot = page.insert_tuple(&t).unwrap().slot;
        let mut stored = page.get_tuple(inserted_slot).unwrap();
        page.delete_tuple(&mut stored.clone()).unwrap();
        assert!(matches!(
            page.delete_tuple(&mut stored),
            Err(DbError::SlotEmpty(_))
        ));
    }

    #[test]
    fn test_page_data_round_trip() {
        let scheme = small_int_schema(3, "");
        let mut page = empty_page(&scheme);
        for i in 0..17 {
            page.insert_tuple(&Tuple::new_int_tuple(i * 3, 3)).unwrap();
        }
        let mut gone = page.get_tuple(5).unwrap();
        page.delete_tuple(&mut gone).unwrap();

        let data = page.get_page_data();
        assert_eq!(data.len(), BufferPool::get_page_size());

        let reborn = HeapPage::new(&page.get_pid(), &data, &scheme);
        assert_eq!(reborn.get_page_data(), data);
        assert_eq!(reborn.tuples_count(), 16);
        let original: Vec<Tuple> = page.iter().collect();
        let decoded: Vec<Tuple> = reborn.iter().collect();
        assert_eq!(original, decoded);
    }
}
