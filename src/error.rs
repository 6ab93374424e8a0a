use thiserror::Error;

/// Failure modes of the storage and transaction core.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("page full: {0}")]
    PageFull(String),

    #[error("slot empty: {0}")]
    SlotEmpty(String),

    #[error("no such field: {0}")]
    NoSuchField(String),

    #[error("no such table: {0}")]
    NoSuchTable(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("buffer full: {0}")]
    BufferFull(String),

    #[error("invalid page: {0}")]
    InvalidPage(String),

    #[error("io failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;
