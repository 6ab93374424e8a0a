use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{error::DbResult, Database};

static TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A transaction handle, identified by a monotonically increasing id.
/// All locking and undo state is keyed by this value.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Transaction {
    uuid: u64,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            uuid: TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn get_id(&self) -> u64 {
        self.uuid
    }

    /// Flush this transaction's dirty pages and release its locks. When
    /// this returns, the transaction's writes are on disk.
    pub fn commit(&self) -> DbResult<()> {
        Database::buffer_pool().tx_complete(self, true)
    }

    /// Restore every page this transaction touched from its before-image
    /// and release its locks.
    pub fn abort(&self) -> DbResult<()> {
        Database::buffer_pool().tx_complete(self, false)
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.uuid)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
