pub mod cell;
pub mod schema;
pub mod tuple;

pub use cell::Cell;
pub use schema::{FieldItem, Schema, Type};
pub use tuple::{RecordId, Tuple};
