//! Transaction-level and call-level errors.

use crate::result::TxFailure;
use ledgerflow_core::{MessageError, TransactionError};
use ledgerflow_storage::StoreError;
use thiserror::Error;

/// Codespace of failures raised by the engine itself.
pub const STF_CODESPACE: &str = "stf";

/// Codespace of undecodable transactions.
pub const DECODE_CODESPACE: &str = "decode";

/// Errors raised while executing one transaction, query or hook.
///
/// Most variants are local to the transaction and end up in its
/// [`TxResult`](crate::TxResult). [`TxError::is_fatal`] tells which ones must
/// abort the enclosing call instead.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("out of gas (limit {limit}, wanted {wanted})")]
    OutOfGas { limit: u64, wanted: u64 },

    #[error("invalid transaction: {0}")]
    InvalidTx(#[from] TransactionError),

    #[error("{0}")]
    Message(#[from] MessageError),

    #[error("no handler registered for {0}")]
    UnknownMessage(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Business-rule rejection raised by an application module.
    #[error("{codespace} error {code}: {reason}")]
    Application {
        codespace: String,
        code: u32,
        reason: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("execution cancelled")]
    Cancelled,
}

impl TxError {
    /// Whether the error aborts the enclosing call rather than failing only
    /// the current transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TxError::Store(_) | TxError::Cancelled)
    }

    pub fn codespace(&self) -> &str {
        match self {
            TxError::InvalidTx(TransactionError::Decode(_)) => DECODE_CODESPACE,
            TxError::Application { codespace, .. } => codespace,
            _ => STF_CODESPACE,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            TxError::InvalidTx(TransactionError::Decode(_)) => 1,
            TxError::InvalidTx(_) => 2,
            TxError::OutOfGas { .. } => 3,
            TxError::Message(_) => 4,
            TxError::UnknownMessage(_) => 5,
            TxError::Unauthorized(_) => 6,
            TxError::NotFound(_) => 7,
            TxError::InvalidRequest(_) => 8,
            TxError::Application { code, .. } => *code,
            TxError::Store(_) => 9,
            TxError::Cancelled => 10,
        }
    }

    /// Serializable form recorded in a transaction result.
    pub fn to_failure(&self) -> TxFailure {
        TxFailure {
            codespace: self.codespace().to_string(),
            code: self.code(),
            reason: self.to_string(),
        }
    }
}

/// Call-level errors: the whole operation failed and produced no state.
#[derive(Debug, Error)]
pub enum StfError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("execution cancelled")]
    Cancelled,

    #[error("malformed block: {0}")]
    MalformedBlock(String),

    #[error("{stage} hook failed: {reason}")]
    BlockHook { stage: &'static str, reason: String },

    #[error("handler for {0} already registered")]
    DuplicateHandler(String),

    /// Non-fatal failure of a query or closure run outside a transaction.
    #[error("execution failed: {0}")]
    Execution(TxError),
}

impl StfError {
    /// Store and cancellation errors keep their identity; everything else
    /// wraps as [`StfError::Execution`].
    pub fn escalate(err: TxError) -> Self {
        match err {
            TxError::Store(e) => StfError::Store(e),
            TxError::Cancelled => StfError::Cancelled,
            other => StfError::Execution(other),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StfError::Cancelled)
    }
}

impl From<TxError> for StfError {
    fn from(err: TxError) -> Self {
        StfError::escalate(err)
    }
}

/// Result type for engine calls.
pub type Result<T> = std::result::Result<T, StfError>;
