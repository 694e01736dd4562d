use std::path::PathBuf;

/// Failures of the persisted index.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another process holds the write lock on the index. Fatal: the caller
    /// should report which database is contended and stop, not spin.
    #[error("index database is locked by another process: {path}")]
    Locked { path: PathBuf },

    #[error("index i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record does not decode. Points at a truncated or foreign
    /// file rather than a usage error.
    #[error("corrupt index record: {0}")]
    Corrupt(String),

    #[error("index backend error: {0}")]
    Backend(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
