use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use crate::log::init_log;
use crate::storage::schema::{FieldItem, Schema, Type};

/// A handy shortcut for the `RwLock` write()/read().unwrap() pattern.
pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}

pub fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

pub fn floor_div(a: usize, b: usize) -> usize {
    a / b
}

/// A schema of `columns` int fields, named `<prefix>0`, `<prefix>1`, ...
pub fn small_int_schema(columns: usize, prefix: &str) -> Schema {
    let mut fields = Vec::new();
    for i in 0..columns {
        fields.push(FieldItem::new(&format!("{}{}", prefix, i), Type::Int));
    }
    Schema::new(fields)
}
