use thiserror::Error;

/// Errors produced by the local cache.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error, including rows whose columns fail to parse.
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Creating the cache directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup that must match a row found none.
    #[error("Cached record not found")]
    NotFound,

    /// A schema migration failed; the cache is unusable.
    #[error("Cache migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
