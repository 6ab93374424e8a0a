use std::cmp;

use crate::{
    btree::{
        entry::{IndexEntry, WrappedEntry},
        page::{BTreeInternalPage, BTreeLeafPage, Entry},
        table::{mark_dirty, SearchFor},
        BTreeTable,
    },
    error::{DbError, DbResult},
    page::{BasePage, PageCategory, PageId},
    predicate::Op,
    transaction::{Permission, Transaction},
    types::Pod,
    utils::HandyRwLock,
    Database,
};

impl BTreeTable {
    /// Remove the entry at the leaf slot it was scanned from, then
    /// rebalance if the leaf dropped below minimum occupancy.
    pub fn delete_entry(&self, tx: &Transaction, entry: &WrappedEntry) -> DbResult<()> {
        let pid = entry.get_pid();
        let leaf_rc = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &pid)?;

        // hold the leaf
        {
            let mut leaf = leaf_rc.wl();
            if !leaf.is_slot_used(entry.get_slot_number()) {
                return Err(DbError::SlotEmpty(format!(
                    "{}#{}",
                    pid,
                    entry.get_slot_number()
                )));
            }
            leaf.delete_entry(entry.get_slot_number());
        }
        // release the leaf

        mark_dirty(tx, &leaf_rc);

        if leaf_rc.rl().stable() {
            return Ok(());
        }
        self.handle_erratic_leaf_page(tx, leaf_rc)
    }

    /// Find the entry by key and record id, then remove it.
    pub fn delete(&self, tx: &Transaction, entry: &IndexEntry) -> DbResult<()> {
        let root_pid = self.get_root_pid(tx, Permission::ReadWrite)?;
        let mut leaf_rc = self.find_leaf_page(
            tx,
            Permission::ReadWrite,
            root_pid,
            &SearchFor::Target(entry.get_key(), Op::Equals),
        )?;

        // duplicates may spill over leaf boundaries, so walk the chain
        // until the keys pass the target
        loop {
            let mut found: Option<WrappedEntry> = None;
            let mut passed = false;
            let right_pid;

            // hold the leaf
            {
                let leaf = leaf_rc.rl();
                for we in leaf.iter() {
                    if we.get_entry() == entry {
                        found = Some(we);
                        break;
                    }
                    if we.get_key() > entry.get_key() {
                        passed = true;
                        break;
                    }
                }
                right_pid = leaf.get_right_pid();
            }
            // release the leaf

            if let Some(we) = found {
                return self.delete_entry(tx, &we);
            }
            if passed || right_pid.is_none() {
                return Err(DbError::SlotEmpty(format!("entry {} not found", entry)));
            }
            leaf_rc = Database::buffer_pool().get_leaf_page(
                tx,
                Permission::ReadWrite,
                &right_pid.unwrap(),
            )?;
        }
    }

    /// A leaf fell below minimum occupancy: steal entries from a sibling
    /// under the same parent, or merge when the two fit in one page. The
    /// left sibling is preferred.
    fn handle_erratic_leaf_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeLeafPage>,
    ) -> DbResult<()> {
        let parent_pid = page_rc.rl().get_parent_pid();
        if parent_pid.category == PageCategory::RootPointer {
            return Ok(());
        }

        let pid = page_rc.rl().get_pid();
        let (left_pid, right_pid) = self.find_siblings(tx, &parent_pid, &pid)?;

        if let Some(left_pid) = left_pid {
            let left_rc =
                Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &left_pid)?;
            self.balancing_two_leaf_pages(tx, left_rc, page_rc)
        } else if let Some(right_pid) = right_pid {
            let right_rc =
                Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &right_pid)?;
            self.balancing_two_leaf_pages(tx, page_rc, right_rc)
        } else {
            Err(DbError::InvalidPage(format!(
                "{} has neither sibling under {}",
                pid, parent_pid
            )))
        }
    }

    /// An internal page fell below minimum occupancy.
    fn handle_erratic_internal_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeInternalPage>,
    ) -> DbResult<()> {
        let parent_pid = page_rc.rl().get_parent_pid();
        if parent_pid.category == PageCategory::RootPointer {
            return Ok(());
        }

        let pid = page_rc.rl().get_pid();
        let (left_pid, right_pid) = self.find_siblings(tx, &parent_pid, &pid)?;

        if let Some(left_pid) = left_pid {
            let left_rc =
                Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &left_pid)?;
            self.balancing_two_internal_pages(tx, left_rc, page_rc)
        } else if let Some(right_pid) = right_pid {
            let right_rc =
                Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &right_pid)?;
            self.balancing_two_internal_pages(tx, page_rc, right_rc)
        } else {
            Err(DbError::InvalidPage(format!(
                "{} has neither sibling under {}",
                pid, parent_pid
            )))
        }
    }

    /// Siblings sharing the page's parent, read off the parent's entry
    /// list. Sibling pointers of the leaf chain are not used here since
    /// they may cross parent boundaries.
    fn find_siblings(
        &self,
        tx: &Transaction,
        parent_pid: &PageId,
        pid: &PageId,
    ) -> DbResult<(Option<PageId>, Option<PageId>)> {
        let parent_rc =
            Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, parent_pid)?;
        let parent = parent_rc.rl();

        let mut left = None;
        let mut right = None;
        for e in parent.iter() {
            if e.get_right_child() == *pid {
                left = Some(e.get_left_child());
            }
            if e.get_left_child() == *pid {
                right = Some(e.get_right_child());
            }
        }
        Ok((left, right))
    }

    /// Redistribute or merge two leaf siblings under the same parent.
    fn balancing_two_leaf_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
    ) -> DbResult<()> {
        let parent_pid = left_rc.rl().get_parent_pid();
        let parent_rc =
            Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;
        let mut entry = parent_rc
            .rl()
            .get_entry_by_children(&left_rc.rl().get_pid(), &right_rc.rl().get_pid())
            .ok_or_else(|| {
                DbError::InvalidPage(format!("no separator between siblings in {}", parent_pid))
            })?;

        let left_count = left_rc.rl().entries_count();
        let right_count = right_rc.rl().entries_count();

        if left_count + right_count <= left_rc.rl().get_slots_count() {
            return self.merge_leaf_page(tx, left_rc, right_rc, parent_rc, &entry);
        }

        let move_count = (left_count + right_count) / 2 - cmp::min(left_count, right_count);
        if move_count == 0 {
            return Ok(());
        }

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            if left_count < right_count {
                let moved: Vec<_> = right.iter().take(move_count).collect();
                for e in moved.iter() {
                    left.insert_entry(e.get_entry())?;
                }
                for e in moved.iter() {
                    right.delete_entry(e.get_slot_number());
                }
            } else {
                let moved: Vec<_> = left.iter().rev().take(move_count).collect();
                for e in moved.iter() {
                    right.insert_entry(e.get_entry())?;
                }
                for e in moved.iter() {
                    left.delete_entry(e.get_slot_number());
                }
            }

            // the separator becomes the smallest key now on the right
            match right.iter().next() {
                Some(e) => entry.set_key(&e.get_key()),
                None => {
                    return Err(DbError::InvalidPage(format!(
                        "{} emptied by redistribution",
                        right.get_pid()
                    )))
                }
            }
        }
        // release the left and right page

        parent_rc.wl().update_entry(&entry);

        mark_dirty(tx, &left_rc);
        mark_dirty(tx, &right_rc);
        mark_dirty(tx, &parent_rc);
        Ok(())
    }

    /// Concatenate two leaf siblings into the left page, unlink the right
    /// page from the sibling chain and return it to the free list.
    fn merge_leaf_page(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> DbResult<()> {
        let right_pid;

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();
            right_pid = right.get_pid();

            let moved: Vec<_> = right.iter().collect();
            for e in moved.iter() {
                left.insert_entry(e.get_entry())?;
            }
            for e in moved.iter() {
                right.delete_entry(e.get_slot_number());
            }

            left.set_right_pid(right.get_right_pid());
            if let Some(new_right_pid) = right.get_right_pid() {
                let new_right_rc =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &new_right_pid)?;
                new_right_rc.wl().set_left_pid(Some(left.get_pid()));
                mark_dirty(tx, &new_right_rc);
            }
        }
        // release the left and right page

        mark_dirty(tx, &left_rc);
        self.set_empty_page(tx, &right_pid)?;
        self.delete_parent_entry(tx, &left_rc, &parent_rc, entry)
    }

    /// Redistribute or merge two internal siblings. Keys rotate through
    /// the parent: the old separator comes down into the receiving page
    /// and the boundary key of the donor goes up.
    fn balancing_two_internal_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
    ) -> DbResult<()> {
        let parent_pid = left_rc.rl().get_parent_pid();
        let parent_rc =
            Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;
        let mut entry = parent_rc
            .rl()
            .get_entry_by_children(&left_rc.rl().get_pid(), &right_rc.rl().get_pid())
            .ok_or_else(|| {
                DbError::InvalidPage(format!("no separator between siblings in {}", parent_pid))
            })?;

        let left_children = left_rc.rl().children_count();
        let right_children = right_rc.rl().children_count();

        if left_children + right_children <= left_rc.rl().get_children_capacity() {
            return self.merge_internal_page(tx, left_rc, right_rc, parent_rc, &entry);
        }

        let move_count =
            (left_children + right_children) / 2 - cmp::min(left_children, right_children);
        if move_count == 0 {
            return Ok(());
        }

        let mut middle_key = entry.get_key();

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            if left_children < right_children {
                for _ in 0..move_count {
                    let donor = match right.iter().next() {
                        Some(e) => e,
                        None => break,
                    };
                    let left_edge = left.get_last_child_pid();
                    let moved_child = donor.get_left_child();

                    left.insert_entry(&Entry::new(&middle_key, &left_edge, &moved_child))?;
                    self.set_parent(tx, &moved_child, &left.get_pid())?;

                    middle_key = donor.get_key();
                    right.delete_key_and_left_child(donor.get_record_id());
                }
            } else {
                for _ in 0..move_count {
                    let donor = match left.iter().next_back() {
                        Some(e) => e,
                        None => break,
                    };
                    let right_edge = right.get_first_child_pid();
                    let moved_child = donor.get_right_child();

                    right.insert_entry(&Entry::new(&middle_key, &moved_child, &right_edge))?;
                    self.set_parent(tx, &moved_child, &right.get_pid())?;

                    middle_key = donor.get_key();
                    left.delete_key_and_right_child(donor.get_record_id());
                }
            }
        }
        // release the left and right page

        entry.set_key(&middle_key);
        parent_rc.wl().update_entry(&entry);

        mark_dirty(tx, &left_rc);
        mark_dirty(tx, &right_rc);
        mark_dirty(tx, &parent_rc);
        Ok(())
    }

    /// Concatenate two internal siblings into the left page. The parent
    /// separator is pulled down between them, and children moved over get
    /// their parent pointers fixed.
    fn merge_internal_page(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> DbResult<()> {
        let right_pid;

        // hold the left and right page
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();
            right_pid = right.get_pid();

            let edge_entry = Entry::new(
                &entry.get_key(),
                &left.get_last_child_pid(),
                &right.get_first_child_pid(),
            );
            self.set_parent(tx, &right.get_first_child_pid(), &left.get_pid())?;
            left.insert_entry(&edge_entry)?;

            let moved: Vec<Entry> = right.iter().collect();
            for e in moved.iter() {
                left.insert_entry(e)?;
                self.set_parent(tx, &e.get_right_child(), &left.get_pid())?;
            }
            for e in moved.iter() {
                right.delete_key_and_right_child(e.get_record_id());
            }
        }
        // release the left and right page

        mark_dirty(tx, &left_rc);
        self.set_empty_page(tx, &right_pid)?;
        self.delete_parent_entry(tx, &left_rc, &parent_rc, entry)
    }

    /// Remove a separator (key and right child) from a parent after a
    /// merge. An emptied parent was the root: the surviving child is
    /// promoted and the old root page freed. A parent below minimum
    /// occupancy rebalances recursively.
    fn delete_parent_entry<P>(
        &self,
        tx: &Transaction,
        left_rc: &Pod<P>,
        parent_rc: &Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> DbResult<()>
    where
        P: std::ops::DerefMut<Target = BasePage>,
    {
        let stable;
        // hold the parent
        {
            let mut parent = parent_rc.wl();
            parent.delete_key_and_right_child(entry.get_record_id());

            if parent.entries_count() == 0 {
                let parent_pid = parent.get_pid();
                let left_pid = left_rc.rl().get_pid();

                let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadWrite)?;
                // hold the root pointer
                {
                    let mut root_ptr = root_ptr_rc.wl();
                    left_rc.wl().set_parent_pid(&root_ptr.get_pid());
                    root_ptr.set_root_pid(&left_pid);
                }
                // release the root pointer

                mark_dirty(tx, &root_ptr_rc);
                drop(parent);
                self.set_empty_page(tx, &parent_pid)?;
                return Ok(());
            }

            stable = parent.stable();
        }
        // release the parent

        mark_dirty(tx, parent_rc);
        if stable {
            return Ok(());
        }
        self.handle_erratic_internal_page(tx, parent_rc.clone())
    }

    /// Return a page to the file's free list: drop it from the buffer
    /// pool and clear its bit in the header bitmap, creating the first
    /// header page on demand.
    pub fn set_empty_page(&self, tx: &Transaction, pid: &PageId) -> DbResult<()> {
        Database::buffer_pool().discard_page(pid);

        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadWrite)?;

        let header_rc = match root_ptr_rc.rl().get_header_pid() {
            Some(header_pid) => {
                Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &header_pid)?
            }
            None => {
                let header_rc = self.get_empty_header_page(tx)?;
                root_ptr_rc.wl().set_header_pid(&header_rc.rl().get_pid());
                mark_dirty(tx, &root_ptr_rc);
                header_rc
            }
        };

        header_rc
            .wl()
            .mark_slot_status(pid.page_index as usize, false);
        mark_dirty(tx, &header_rc);
        Ok(())
    }
}
