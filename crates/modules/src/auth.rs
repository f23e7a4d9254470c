//! Accounts: signature and nonce checks for every transaction.

use ledgerflow_core::{Address, Event, SignedTx, Transaction, TypedMessage};
use ledgerflow_stf::{
    BlockHooks, ExecMode, ExecutionContext, StfBuilder, StfError, TxError, TxValidator,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Store partition owned by this module.
pub const PARTITION: &str = "auth";
pub const CODESPACE: &str = "auth";

const LAST_BLOCK_KEY: &[u8] = b"last_block";

/// Errors raised by the auth module.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("signature verification failed for {0}")]
    InvalidSignature(Address),

    #[error("invalid nonce for {address}: expected {expected}, got {got}")]
    InvalidNonce {
        address: Address,
        expected: u64,
        got: u64,
    },

    #[error("account {0} not found")]
    AccountNotFound(Address),
}

impl AuthError {
    pub fn code(&self) -> u32 {
        match self {
            AuthError::InvalidSignature(_) => 1,
            AuthError::InvalidNonce { .. } => 2,
            AuthError::AccountNotFound(_) => 3,
        }
    }
}

impl From<AuthError> for TxError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccountNotFound(_) => TxError::NotFound(err.to_string()),
            other => TxError::Application {
                codespace: CODESPACE.to_string(),
                code: other.code(),
                reason: other.to_string(),
            },
        }
    }
}

// =============================================================================
// State access
// =============================================================================

fn nonce_key(address: &Address) -> Vec<u8> {
    let mut key = b"nonce:".to_vec();
    key.extend_from_slice(address.as_bytes());
    key
}

/// Next expected nonce, or `None` for an account that never transacted.
pub fn get_nonce(ctx: &mut ExecutionContext<'_>, address: &Address) -> Result<Option<u64>, TxError> {
    ctx.get_typed(PARTITION, &nonce_key(address))
}

/// Bump the nonce and return the old value.
pub fn increment_nonce(ctx: &mut ExecutionContext<'_>, address: &Address) -> Result<u64, TxError> {
    let current = get_nonce(ctx, address)?.unwrap_or(0);
    ctx.set_typed(PARTITION, nonce_key(address), &current.saturating_add(1))?;
    Ok(current)
}

/// Last block seen by the begin-block hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBlock {
    pub height: u64,
    /// Unix seconds.
    pub time: i64,
}

pub fn last_block(ctx: &mut ExecutionContext<'_>) -> Result<Option<LastBlock>, TxError> {
    ctx.get_typed(PARTITION, LAST_BLOCK_KEY)
}

// =============================================================================
// Validator
// =============================================================================

/// Checks signature and nonce of every [`SignedTx`] and charges gas for its
/// size.
///
/// Signatures are not checked in simulate mode so that unsigned transactions
/// can be estimated.
#[derive(Debug, Clone, Copy)]
pub struct AuthValidator {
    pub tx_size_cost_per_byte: u64,
}

impl Default for AuthValidator {
    fn default() -> Self {
        Self {
            tx_size_cost_per_byte: 10,
        }
    }
}

impl TxValidator<SignedTx> for AuthValidator {
    fn validate(&self, ctx: &mut ExecutionContext<'_>, tx: &SignedTx) -> Result<(), TxError> {
        let size = tx.encode().len() as u64;
        ctx.consume_gas(size.saturating_mul(self.tx_size_cost_per_byte))?;

        let sender = tx.sender();
        if ctx.mode() != ExecMode::Simulate {
            if let Err(err) = tx.verify() {
                debug!(%sender, error = %err, "Rejected signature");
                return Err(AuthError::InvalidSignature(sender).into());
            }
        }

        let expected = get_nonce(ctx, &sender)?.unwrap_or(0);
        if tx.nonce() != expected {
            debug!(%sender, expected, got = tx.nonce(), "Rejected nonce");
            return Err(AuthError::InvalidNonce {
                address: sender,
                expected,
                got: tx.nonce(),
            }
            .into());
        }
        increment_nonce(ctx, &sender)?;

        ctx.emit_event(
            Event::new("tx")
                .with_attribute("sender", sender)
                .with_attribute("nonce", expected),
        );
        Ok(())
    }
}

// =============================================================================
// Hooks
// =============================================================================

/// Records the height and time of every block.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthHooks;

impl BlockHooks for AuthHooks {
    fn begin_block(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), TxError> {
        let header = ctx.header();
        let marker = LastBlock {
            height: header.height,
            time: header.time.timestamp(),
        };
        ctx.set_typed(PARTITION, LAST_BLOCK_KEY.to_vec(), &marker)
    }
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAccount {
    pub address: Address,
}

impl TypedMessage for QueryAccount {
    const TYPE_URL: &'static str = "/ledgerflow.auth.v1.QueryAccount";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAccountResponse {
    pub address: Address,
    /// Next nonce the account must use.
    pub nonce: u64,
}

impl TypedMessage for QueryAccountResponse {
    const TYPE_URL: &'static str = "/ledgerflow.auth.v1.QueryAccountResponse";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLastBlock;

impl TypedMessage for QueryLastBlock {
    const TYPE_URL: &'static str = "/ledgerflow.auth.v1.QueryLastBlock";
}

impl TypedMessage for LastBlock {
    const TYPE_URL: &'static str = "/ledgerflow.auth.v1.LastBlock";
}

fn query_account(
    ctx: &mut ExecutionContext<'_>,
    req: QueryAccount,
) -> Result<QueryAccountResponse, TxError> {
    match get_nonce(ctx, &req.address)? {
        Some(nonce) => Ok(QueryAccountResponse {
            address: req.address,
            nonce,
        }),
        None => Err(AuthError::AccountNotFound(req.address).into()),
    }
}

fn query_last_block(ctx: &mut ExecutionContext<'_>, _: QueryLastBlock) -> Result<LastBlock, TxError> {
    last_block(ctx)?.ok_or_else(|| TxError::NotFound("no block delivered yet".into()))
}

/// Register the auth queries.
pub fn register<T: Transaction>(builder: &mut StfBuilder<T>) -> Result<(), StfError> {
    let queries = builder.query_router_mut();
    queries.register(query_account)?;
    queries.register(query_last_block)?;
    Ok(())
}
