use std::{
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use once_cell::sync::Lazy;

use crate::{
    buffer_pool::BufferPool,
    catalog::Catalog,
    stats,
    transaction::LockManager,
    utils::HandyRwLock,
};

static DB: Lazy<Database> = Lazy::new(Database::new);

/// The process-wide environment: buffer pool, catalog, lock manager and
/// the directory table files live in. Tests call [`Database::reset`]
/// between cases to get a pristine state.
pub struct Database {
    path: RwLock<PathBuf>,

    buffer_pool: BufferPool,
    catalog: RwLock<Catalog>,
    lock_manager: LockManager,
}

impl Database {
    fn new() -> Self {
        let db_path = PathBuf::from("data").join("default_db");
        if !db_path.exists() {
            std::fs::create_dir_all(&db_path).unwrap();
        }

        Self {
            path: RwLock::new(db_path),
            buffer_pool: BufferPool::new(),
            catalog: RwLock::new(Catalog::new()),
            lock_manager: LockManager::new(),
        }
    }

    pub fn global() -> &'static Database {
        &DB
    }

    pub fn buffer_pool() -> &'static BufferPool {
        &Self::global().buffer_pool
    }

    pub fn lock_manager() -> &'static LockManager {
        &Self::global().lock_manager
    }

    pub fn catalog() -> RwLockReadGuard<'static, Catalog> {
        Self::global().catalog.rl()
    }

    pub fn mut_catalog() -> RwLockWriteGuard<'static, Catalog> {
        Self::global().catalog.wl()
    }

    pub fn get_path(&self) -> PathBuf {
        self.path.rl().clone()
    }

    /// Restore every piece of process-global state to its defaults and
    /// empty the data directory. For use between test cases; live
    /// transactions must be finished first.
    pub fn reset() {
        BufferPool::reset_page_size();
        BufferPool::reset_capacity();
        LockManager::reset_timeout();
        stats::reset_config();

        let db = Self::global();
        db.buffer_pool.clear();
        db.catalog.wl().clear();
        db.lock_manager.clear();

        let path = db.get_path();
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
    }
}
