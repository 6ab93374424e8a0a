use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Condvar, Mutex,
    },
    time::{Duration, Instant},
};

use log::debug;

use crate::{
    error::{DbError, DbResult},
    page::PageId,
    transaction::Transaction,
};

/// Upper bound on a blocking acquire, in seconds. There is no deadlock
/// detection; a wait that outlives this is reported as an aborted
/// transaction so the caller can give up and roll back.
static TIMEOUT_SECS: AtomicU64 = AtomicU64::new(10);

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Lock {
    SLock,
    XLock,
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

#[derive(Default)]
struct LockTables {
    s_locks: HashMap<PageId, HashSet<Transaction>>,
    x_locks: HashMap<PageId, Transaction>,

    // every page a transaction holds any lock on, for release_all
    hold_pages: HashMap<Transaction, HashSet<PageId>>,
}

impl LockTables {
    fn record_hold(&mut self, tx: &Transaction, pid: &PageId) {
        self.hold_pages.entry(*tx).or_default().insert(*pid);
    }

    fn s_conflict(&self, tx: &Transaction, pid: &PageId) -> bool {
        match self.x_locks.get(pid) {
            Some(owner) => owner != tx,
            None => false,
        }
    }

    fn x_conflict(&self, tx: &Transaction, pid: &PageId) -> bool {
        if let Some(owner) = self.x_locks.get(pid) {
            if owner != tx {
                return true;
            }
        }
        if let Some(readers) = self.s_locks.get(pid) {
            if !readers.is_empty() {
                return true;
            }
        }
        false
    }
}

/// Per-page shared/exclusive locks with transaction-scoped holding.
/// Blocking waits happen on a single condition variable guarding both
/// lock tables.
pub struct LockManager {
    state: Mutex<LockTables>,
    cond: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockTables::default()),
            cond: Condvar::new(),
        }
    }

    pub fn set_timeout(secs: u64) {
        TIMEOUT_SECS.store(secs, Ordering::Relaxed);
    }

    pub fn reset_timeout() {
        TIMEOUT_SECS.store(DEFAULT_TIMEOUT_SECS, Ordering::Relaxed);
    }

    /// Block until the lock is granted. Shared requests wait out a
    /// foreign exclusive holder; exclusive requests wait until no other
    /// transaction holds anything. A transaction that is the sole reader
    /// of the page upgrades in place.
    pub fn acquire(&self, tx: &Transaction, pid: &PageId, lock: &Lock) -> DbResult<()> {
        debug!("{} acquiring {} on {}", tx, lock, pid);

        let deadline = Instant::now() + Duration::from_secs(TIMEOUT_SECS.load(Ordering::Relaxed));
        let mut state = self.state.lock().unwrap();

        match lock {
            Lock::SLock => {
                while state.s_conflict(tx, pid) {
                    state = self.wait(state, deadline, tx, pid, lock)?;
                }
                state.s_locks.entry(*pid).or_default().insert(*tx);
            }
            Lock::XLock => {
                // drop our own shared lock first so the upgrade can go
                // through; with other readers present we wait like
                // everyone else
                if let Some(readers) = state.s_locks.get_mut(pid) {
                    if readers.len() == 1 {
                        readers.remove(tx);
                    }
                }

                while state.x_conflict(tx, pid) {
                    state = self.wait(state, deadline, tx, pid, lock)?;
                }
                state.x_locks.insert(*pid, *tx);
            }
        }

        state.record_hold(tx, pid);
        Ok(())
    }

    fn wait<'a>(
        &self,
        state: std::sync::MutexGuard<'a, LockTables>,
        deadline: Instant,
        tx: &Transaction,
        pid: &PageId,
        lock: &Lock,
    ) -> DbResult<std::sync::MutexGuard<'a, LockTables>> {
        let now = Instant::now();
        if now >= deadline {
            return Err(DbError::TransactionAborted(format!(
                "{} timed out acquiring {} on {}",
                tx, lock, pid
            )));
        }
        let (state, _timeout) = self.cond.wait_timeout(state, deadline - now).unwrap();
        Ok(state)
    }

    /// Release a single lock on a page, whichever side it is on.
    pub fn release(&self, tx: &Transaction, pid: &PageId) {
        let mut state = self.state.lock().unwrap();

        if let Some(readers) = state.s_locks.get_mut(pid) {
            readers.remove(tx);
            if readers.is_empty() {
                state.s_locks.remove(pid);
            }
        }
        if state.x_locks.get(pid) == Some(tx) {
            state.x_locks.remove(pid);
        }
        if let Some(pages) = state.hold_pages.get_mut(tx) {
            pages.remove(pid);
        }

        self.cond.notify_all();
    }

    /// Release everything a transaction holds. Called from the buffer
    /// pool once commit or abort has finished its page work.
    pub fn release_all(&self, tx: &Transaction) {
        let mut state = self.state.lock().unwrap();

        let pages = match state.hold_pages.remove(tx) {
            Some(pages) => pages,
            None => return,
        };
        for pid in pages {
            if let Some(readers) = state.s_locks.get_mut(&pid) {
                readers.remove(tx);
                if readers.is_empty() {
                    state.s_locks.remove(&pid);
                }
            }
            if state.x_locks.get(&pid) == Some(tx) {
                state.x_locks.remove(&pid);
            }
        }

        debug!("{} released all locks", tx);
        self.cond.notify_all();
    }

    /// True iff some transaction holds the exclusive lock on the page.
    /// The buffer pool treats such pages as pinned.
    pub fn has_writer(&self, pid: &PageId) -> bool {
        let state = self.state.lock().unwrap();
        state.x_locks.contains_key(pid)
    }

    /// True iff the transaction is the writer or a reader of the page.
    pub fn holds_lock(&self, tx: &Transaction, pid: &PageId) -> bool {
        let state = self.state.lock().unwrap();

        if state.x_locks.get(pid) == Some(tx) {
            return true;
        }
        match state.s_locks.get(pid) {
            Some(readers) => readers.contains(tx),
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.s_locks.clear();
        state.x_locks.clear();
        state.hold_pages.clear();
        self.cond.notify_all();
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageCategory;
    use std::{sync::Arc, thread, time::Duration};

    fn pid(i: u32) -> PageId {
        PageId::new(PageCategory::Heap, 1, i)
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lm = LockManager::new();
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        lm.acquire(&t1, &pid(0), &Lock::SLock).unwrap();
        lm.acquire(&t2, &pid(0), &Lock::SLock).unwrap();
        assert!(lm.holds_lock(&t1, &pid(0)));
        assert!(lm.holds_lock(&t2, &pid(0)));
    }

    #[test]
    fn test_exclusive_excludes() {
        LockManager::set_timeout(1);
        let lm = LockManager::new();
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        lm.acquire(&t1, &pid(0), &Lock::XLock).unwrap();
        assert!(matches!(
            lm.acquire(&t2, &pid(0), &Lock::XLock),
            Err(DbError::TransactionAborted(_))
        ));
        assert!(matches!(
            lm.acquire(&t2, &pid(0), &Lock::SLock),
            Err(DbError::TransactionAborted(_))
        ));
        LockManager::reset_timeout();
    }

    #[test]
    fn test_reentrant_and_upgrade() {
        let lm = LockManager::new();
        let t1 = Transaction::new();

        lm.acquire(&t1, &pid(0), &Lock::SLock).unwrap();
        // sole reader upgrades in place
        lm.acquire(&t1, &pid(0), &Lock::XLock).unwrap();
        // and the writer may keep reading
        lm.acquire(&t1, &pid(0), &Lock::SLock).unwrap();
        assert!(lm.holds_lock(&t1, &pid(0)));
    }

    #[test]
    fn test_release_all_unblocks_waiter() {
        let lm = Arc::new(LockManager::new());
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        lm.acquire(&t1, &pid(0), &Lock::XLock).unwrap();

        let lm2 = Arc::clone(&lm);
        let handle = thread::spawn(move || lm2.acquire(&t2, &pid(0), &Lock::XLock));

        thread::sleep(Duration::from_millis(50));
        lm.release_all(&t1);

        handle.join().unwrap().unwrap();
        assert!(!lm.holds_lock(&t1, &pid(0)));
        assert!(lm.holds_lock(&t2, &pid(0)));
    }

    #[test]
    fn test_writes_visible_after_release() {
        // release happens-before the next conflicting acquire; modeled
        // here as lock hand-off ordering
        let lm = Arc::new(LockManager::new());
        let t1 = Transaction::new();

        lm.acquire(&t1, &pid(3), &Lock::XLock).unwrap();
        lm.release(&t1, &pid(3));

        let t2 = Transaction::new();
        lm.acquire(&t2, &pid(3), &Lock::XLock).unwrap();
        assert!(!lm.holds_lock(&t1, &pid(3)));
        assert!(lm.holds_lock(&t2, &pid(3)));
    }
}
