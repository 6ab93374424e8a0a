use crate::{
    btree::{
        entry::IndexEntry,
        page::{BTreeInternalPage, BTreeLeafPage, Entry},
        table::{mark_dirty, SearchFor},
        BTreeTable,
    },
    error::{DbError, DbResult},
    page::{PageCategory, PageId},
    predicate::Op,
    storage::cell::Cell,
    transaction::{Permission, Transaction},
    types::{Pod, ResultPod},
    utils::HandyRwLock,
    Database,
};

impl BTreeTable {
    /// Insert an entry, keeping keys sorted. Splits the target leaf (and
    /// recursively its ancestors) when it is full.
    pub fn insert_entry(&self, tx: &Transaction, entry: &IndexEntry) -> DbResult<()> {
        let root_pid = self.get_root_pid(tx, Permission::ReadWrite)?;

        let mut leaf_rc = self.find_leaf_page(
            tx,
            Permission::ReadWrite,
            root_pid,
            &SearchFor::Target(entry.get_key(), Op::Equals),
        )?;

        if leaf_rc.rl().empty_slots_count() == 0 {
            leaf_rc = self.split_leaf_page(tx, leaf_rc, &entry.get_key())?;
        }

        leaf_rc.wl().insert_entry(entry)?;
        mark_dirty(tx, &leaf_rc);
        Ok(())
    }

    /// Split a full leaf into two siblings, lifting the smallest key of
    /// the new right page into the parent as the separator.
    ///
    /// Returns the page whose key range contains `field`; a key equal to
    /// the separator goes to the right page.
    pub fn split_leaf_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeLeafPage>,
        field: &Cell,
    ) -> ResultPod<BTreeLeafPage> {
        let new_sibling_rc = self.get_empty_leaf_page(tx)?;
        let parent_pid: PageId;
        let separator: Cell;

        // hold the old page and the new sibling
        {
            let mut new_sibling = new_sibling_rc.wl();
            let mut page = page_rc.wl();

            // move the upper half of the entries to the new right page
            let move_count = page.entries_count() / 2;
            let moved: Vec<_> = page.iter().rev().take(move_count).collect();
            for e in moved.iter() {
                new_sibling.insert_entry(e.get_entry())?;
            }
            for e in moved.iter() {
                page.delete_entry(e.get_slot_number());
            }

            separator = match new_sibling.iter().next() {
                Some(e) => e.get_key(),
                None => {
                    return Err(DbError::InvalidPage(format!(
                        "split of {} moved no entries",
                        page.get_pid()
                    )))
                }
            };

            // patch the sibling chain: old -> new -> old right
            let old_right_pid = page.get_right_pid();
            if let Some(old_right_pid) = old_right_pid {
                let old_right_rc =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &old_right_pid)?;
                old_right_rc.wl().set_left_pid(Some(new_sibling.get_pid()));
                mark_dirty(tx, &old_right_rc);
            }
            new_sibling.set_right_pid(old_right_pid);
            new_sibling.set_left_pid(Some(page.get_pid()));
            page.set_right_pid(Some(new_sibling.get_pid()));

            parent_pid = page.get_parent_pid();
        }
        // release the old page and the new sibling

        // the parent may need to split itself first, so it is resolved
        // outside the page borrows
        let parent_rc = self.get_parent_with_empty_slots(tx, parent_pid, field)?;

        // hold the parent and both leaves
        {
            let mut parent = parent_rc.wl();
            let mut page = page_rc.wl();
            let mut new_sibling = new_sibling_rc.wl();

            let entry = Entry::new(&separator, &page.get_pid(), &new_sibling.get_pid());
            parent.insert_entry(&entry)?;

            page.set_parent_pid(&parent.get_pid());
            new_sibling.set_parent_pid(&parent.get_pid());
        }
        // release the parent and both leaves

        mark_dirty(tx, &parent_rc);
        mark_dirty(tx, &page_rc);
        mark_dirty(tx, &new_sibling_rc);

        if *field >= separator {
            Ok(new_sibling_rc)
        } else {
            Ok(page_rc)
        }
    }

    /// Get a parent page that is guaranteed to have room for one more
    /// entry: materialize a new root when the parent is the root pointer,
    /// split the parent first when it is full.
    pub(crate) fn get_parent_with_empty_slots(
        &self,
        tx: &Transaction,
        parent_id: PageId,
        field: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        match parent_id.category {
            PageCategory::RootPointer => {
                let new_parent_rc = self.get_empty_internal_page(tx)?;
                let new_parent_pid = new_parent_rc.rl().get_pid();
                self.set_root_pid(tx, &new_parent_pid)?;
                Ok(new_parent_rc)
            }
            PageCategory::Internal => {
                let parent_rc =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_id)?;

                let empty_slots = parent_rc.rl().empty_slots_count();
                if empty_slots > 0 {
                    Ok(parent_rc)
                } else {
                    self.split_internal_page(tx, parent_rc, field)
                }
            }
            _ => Err(DbError::InvalidPage(format!(
                "{} cannot accept separator entries",
                parent_id
            ))),
        }
    }

    /// Split a full internal page. The middle key is pushed up (not
    /// copied) into the parent; children moved to the new right sibling
    /// get their parent pointers updated.
    ///
    /// Returns the half whose key range contains `field`; a key equal to
    /// the pushed-up separator goes left, which keeps descent monotonic.
    pub(crate) fn split_internal_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeInternalPage>,
        field: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        let sibling_rc = self.get_empty_internal_page(tx)?;
        let separator: Cell;
        let mut parent_pid: PageId;

        // hold the old page and the new sibling
        {
            let mut sibling = sibling_rc.wl();
            let mut page = page_rc.wl();

            parent_pid = page.get_parent_pid();
            if parent_pid.category == PageCategory::RootPointer {
                // the split page was the root: a new root is created here
                // so both halves can hang under it
                let parent_rc = self.get_empty_internal_page(tx)?;
                parent_pid = parent_rc.rl().get_pid();
                self.set_root_pid(tx, &parent_pid)?;
            }

            let move_count = page.entries_count() / 2;
            let mut rev: Vec<Entry> = page.iter().rev().take(move_count + 1).collect();
            let middle = match rev.pop() {
                Some(e) => e,
                None => {
                    return Err(DbError::InvalidPage(format!(
                        "split of {} found no middle entry",
                        page.get_pid()
                    )))
                }
            };

            for e in rev.iter() {
                sibling.insert_entry(e)?;
                self.set_parent(tx, &e.get_right_child(), &sibling.get_pid())?;
            }
            for e in rev.iter() {
                page.delete_key_and_right_child(e.get_record_id());
            }

            // the middle entry leaves the page entirely; its right child
            // becomes the left-most child of the sibling
            page.delete_key_and_right_child(middle.get_record_id());
            self.set_parent(tx, &middle.get_right_child(), &sibling.get_pid())?;
            separator = middle.get_key();
        }
        // release the old page and the new sibling

        let parent_rc = self.get_parent_with_empty_slots(tx, parent_pid, field)?;
        let resolved_parent_pid = parent_rc.rl().get_pid();
        page_rc.wl().set_parent_pid(&resolved_parent_pid);
        sibling_rc.wl().set_parent_pid(&resolved_parent_pid);

        // hold the parent
        {
            let mut parent = parent_rc.wl();
            let entry = Entry::new(
                &separator,
                &page_rc.rl().get_pid(),
                &sibling_rc.rl().get_pid(),
            );
            parent.insert_entry(&entry)?;
        }
        // release the parent

        mark_dirty(tx, &parent_rc);
        mark_dirty(tx, &page_rc);
        mark_dirty(tx, &sibling_rc);

        if *field <= separator {
            Ok(page_rc)
        } else {
            Ok(sibling_rc)
        }
    }
}
