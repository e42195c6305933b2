use std::io;

/// Crate-wide error type. Every public-facing operation returns this instead
/// of panicking; the `Display` text is part of the public contract for
/// several variants (callers match on substrings such as "cannot be NULL").
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("page {0} not found")]
    PageNotFound(u64),

    #[error("page corrupt: {0}")]
    Corruption(String),

    #[error("{0}")]
    Schema(String),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Transaction(String),

    #[error("{0}")]
    Constraint(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, Error>;
