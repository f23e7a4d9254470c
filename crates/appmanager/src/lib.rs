//! # ledgerflow-appmanager
//!
//! The façade external callers use instead of touching the engine or the
//! store directly.
//!
//! ```text
//! consensus driver ──deliver_block──▶ AppManager ──▶ Stf ──▶ WriterMap
//!        │                               │
//!        └───────────commit──────────────┴──▶ VersionedStore
//!
//! mempool / servers ──validate_tx / simulate / query──▶ AppManager
//! ```
//!
//! Block delivery checks that the block extends the latest committed version
//! and hands back uncommitted state. Read-side calls pick a committed
//! version with [`StateVersion`] and may run concurrently.

pub mod config;
pub mod manager;

pub use config::{capped_gas, AppManagerConfig, StateVersion};
pub use manager::{AppManager, AppManagerError, Result};
