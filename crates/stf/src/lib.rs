//! Deterministic state-transition engine for ledgerflow.
//!
//! The engine executes transactions and blocks against an immutable
//! [`ReaderMap`](ledgerflow_storage::ReaderMap) and returns the resulting
//! pending writes. It never commits.
//!
//! - [`ExecutionContext`]: per-call branch, gas meter, header and events
//! - [`MsgRouter`]: message and query handlers keyed by type URL
//! - [`TxValidator`] / [`BlockHooks`]: logic run around message execution
//! - [`Stf`]: validate, simulate, query, deliver blocks and sims
//!
//! # Error model
//!
//! Business failures ([`TxError`]) end up inside a [`TxResult`]; a block
//! with failing transactions still completes. Store failures and
//! cancellation are call-level ([`StfError`]) and abort the whole call.

pub mod cancel;
pub mod context;
pub mod error;
pub mod gas;
pub mod hooks;
pub mod result;
pub mod router;
mod sims;
pub mod stf;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use context::{ExecEnv, ExecMode, ExecutionContext};
pub use error::{Result, StfError, TxError, DECODE_CODESPACE, STF_CODESPACE};
pub use gas::{GasConfig, GasMeter};
pub use hooks::{BlockHooks, TxValidator};
pub use result::{BlockResponse, TxFailure, TxResult};
pub use router::{Handler, MsgRouter};
pub use stf::{SimsFailurePolicy, Stf, StfBuilder, StfConfig};
