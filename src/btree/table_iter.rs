use crate::{
    btree::{
        entry::WrappedEntry,
        page::{BTreeLeafPage, BTreeLeafPageIteratorRc},
        table::SearchFor,
        BTreeTable,
    },
    predicate::Op,
    storage::cell::Cell,
    transaction::{Permission, Transaction},
    types::Pod,
    utils::HandyRwLock,
    Database,
};

impl BTreeTable {
    pub fn iter(&self, tx: &Transaction) -> BTreeTableIterator {
        BTreeTableIterator::new(tx, self)
    }

    /// Entries whose key satisfies `<op> <key>`, in key order.
    pub fn search(&self, tx: &Transaction, op: Op, key: &Cell) -> BTreeSearchIterator {
        BTreeSearchIterator::new(tx, self, op, key)
    }
}

/// Full scan in key order, walking the leaf chain through the buffer
/// pool. Supports scanning from both ends.
pub struct BTreeTableIterator {
    tx: Transaction,

    page_rc: Pod<BTreeLeafPage>,
    page_it: BTreeLeafPageIteratorRc,

    last_page_rc: Pod<BTreeLeafPage>,
    last_page_it: BTreeLeafPageIteratorRc,
}

impl BTreeTableIterator {
    pub fn new(tx: &Transaction, table: &BTreeTable) -> Self {
        let page_rc = table.get_first_page(tx, Permission::ReadOnly).unwrap();
        let last_page_rc = table.get_last_page(tx, Permission::ReadOnly).unwrap();

        Self {
            tx: *tx,
            page_rc: Pod::clone(&page_rc),
            page_it: BTreeLeafPageIteratorRc::new(Pod::clone(&page_rc)),
            last_page_rc: Pod::clone(&last_page_rc),
            last_page_it: BTreeLeafPageIteratorRc::new(Pod::clone(&last_page_rc)),
        }
    }
}

impl Iterator for BTreeTableIterator {
    type Item = WrappedEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.page_it.next() {
                return Some(e);
            }

            let right = self.page_rc.rl().get_right_pid()?;
            let sibling_rc = Database::buffer_pool()
                .get_leaf_page(&self.tx, Permission::ReadOnly, &right)
                .ok()?;
            self.page_rc = Pod::clone(&sibling_rc);
            self.page_it = BTreeLeafPageIteratorRc::new(sibling_rc);
        }
    }
}

impl DoubleEndedIterator for BTreeTableIterator {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.last_page_it.next_back() {
                return Some(e);
            }

            let left = self.last_page_rc.rl().get_left_pid()?;
            let sibling_rc = Database::buffer_pool()
                .get_leaf_page(&self.tx, Permission::ReadOnly, &left)
                .ok()?;
            self.last_page_rc = Pod::clone(&sibling_rc);
            self.last_page_it = BTreeLeafPageIteratorRc::new(sibling_rc);
        }
    }
}

/// Key-ordered scan filtered by a single comparison on the key. The
/// iterator starts at the left-most candidate leaf and stops as soon as
/// the predicate can no longer match.
pub struct BTreeSearchIterator {
    tx: Transaction,
    op: Op,
    key: Cell,

    page_rc: Pod<BTreeLeafPage>,
    page_it: BTreeLeafPageIteratorRc,
    exhausted: bool,
}

impl BTreeSearchIterator {
    pub fn new(tx: &Transaction, table: &BTreeTable, op: Op, key: &Cell) -> Self {
        let start_rc = match op {
            Op::Equals | Op::GreaterThan | Op::GreaterThanOrEq => {
                let root_pid = table.get_root_pid(tx, Permission::ReadOnly).unwrap();
                table
                    .find_leaf_page(
                        tx,
                        Permission::ReadOnly,
                        root_pid,
                        &SearchFor::Target(key.clone(), op),
                    )
                    .unwrap()
            }
            _ => table.get_first_page(tx, Permission::ReadOnly).unwrap(),
        };

        Self {
            tx: *tx,
            op,
            key: key.clone(),
            page_rc: Pod::clone(&start_rc),
            page_it: BTreeLeafPageIteratorRc::new(start_rc),
            exhausted: false,
        }
    }
}

impl Iterator for BTreeSearchIterator {
    type Item = WrappedEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        loop {
            match self.page_it.next() {
                Some(e) => {
                    let k = e.get_key();
                    let emit = match self.op {
                        Op::Equals => {
                            if k > self.key {
                                // keys only grow from here on
                                self.exhausted = true;
                                return None;
                            }
                            k == self.key
                        }
                        Op::NotEquals => k != self.key,
                        Op::GreaterThan => k > self.key,
                        Op::GreaterThanOrEq => k >= self.key,
                        Op::LessThan => {
                            if k >= self.key {
                                self.exhausted = true;
                                return None;
                            }
                            true
                        }
                        Op::LessThanOrEq => {
                            if k > self.key {
                                self.exhausted = true;
                                return None;
                            }
                            true
                        }
                    };
                    if emit {
                        return Some(e);
                    }
                }
                None => {
                    let right = match self.page_rc.rl().get_right_pid() {
                        Some(pid) => pid,
                        None => {
                            self.exhausted = true;
                            return None;
                        }
                    };
                    let sibling_rc = Database::buffer_pool()
                        .get_leaf_page(&self.tx, Permission::ReadOnly, &right)
                        .ok()?;
                    self.page_rc = Pod::clone(&sibling_rc);
                    self.page_it = BTreeLeafPageIteratorRc::new(sibling_rc);
                }
            }
        }
    }
}
