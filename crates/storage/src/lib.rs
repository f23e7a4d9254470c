//! Versioned, branchable state storage for ledgerflow.
//!
//! - [`ReaderMap`] / [`Snapshot`]: immutable views of state at one version
//! - [`WriterMap`]: copy-on-write overlay with nested branches
//! - [`VersionedStore`]: one snapshot per committed height, optional sled
//!   persistence
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   Engine (per block / per tx WriterMaps)     │
//! └───────────────────────┬──────────────────────┘
//!                         │ commit(WriterMap)
//! ┌───────────────────────▼──────────────────────┐
//! │  VersionedStore                              │
//! │   v1 ── v2 ── v3 (Arc<Snapshot>, shared      │
//! │                   partitions per version)    │
//! └───────────────────────┬──────────────────────┘
//!                         │ one batch per commit
//! ┌───────────────────────▼──────────────────────┐
//! │  Storage (sled wrapper, latest state only)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use ledgerflow_storage::{ReaderMap, StoreConfig, VersionedStore};
//!
//! let store = VersionedStore::in_memory(StoreConfig::default());
//! let mut writer = store.new_writer();
//! writer.set("bank", b"alice".to_vec(), b"100".to_vec());
//! let info = store.commit(writer).unwrap();
//!
//! let reader = store.open_reader(info.version).unwrap();
//! assert_eq!(reader.get("bank", b"alice").unwrap(), Some(b"100".to_vec()));
//! ```

pub mod db;
pub mod error;
pub mod reader;
pub mod versioned;
pub mod writer;

// Re-export commonly used types
pub use db::{BatchOp, Storage};
pub use error::{Result, StoreError};
pub use reader::{Partition, ReaderMap, Snapshot};
pub use versioned::{CommitInfo, StoreConfig, VersionedStore};
pub use writer::{ChangeSet, PendingOp, WriterMap};
