//! Store errors.

use thiserror::Error;

/// Errors raised by readers, writers and the versioned store.
///
/// Every variant is call-level: the engine never folds a store error into a
/// transaction result.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("version {0} not found (never committed or pruned)")]
    VersionNotFound(u64),

    #[error("writer is based on version {base} but the latest version is {latest}")]
    StaleBase { base: u64, latest: u64 },

    #[error("no open branch to close")]
    NoOpenBranch,

    #[error("cannot commit a writer with {0} open branch(es)")]
    OpenBranches(usize),

    #[error("corrupted store: {0}")]
    Corrupted(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
