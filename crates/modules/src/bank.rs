//! Balances, transfers and minting.

use ledgerflow_core::{Address, Event, Keypair, Message, SignedTx, Transaction, TypedMessage};
use ledgerflow_stf::{ExecutionContext, StfBuilder, StfError, TxError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store partition owned by this module.
pub const PARTITION: &str = "bank";
pub const CODESPACE: &str = "bank";

const SUPPLY_KEY: &[u8] = b"supply";

/// Errors raised by the bank module.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BankError {
    #[error("insufficient funds in {address} (required {required}, available {available})")]
    InsufficientFunds {
        address: Address,
        required: u64,
        available: u64,
    },

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("balance of {0} would overflow")]
    Overflow(Address),

    #[error("signer {signer} cannot spend from {from}")]
    NotOwner { signer: Address, from: Address },

    #[error("only the consensus identity may mint, not {0}")]
    MintNotAllowed(Address),
}

impl BankError {
    pub fn code(&self) -> u32 {
        match self {
            BankError::InsufficientFunds { .. } => 1,
            BankError::ZeroAmount => 2,
            BankError::Overflow(_) => 3,
            BankError::NotOwner { .. } => 4,
            BankError::MintNotAllowed(_) => 5,
        }
    }
}

impl From<BankError> for TxError {
    fn from(err: BankError) -> Self {
        match err {
            BankError::NotOwner { .. } | BankError::MintNotAllowed(_) => {
                TxError::Unauthorized(err.to_string())
            }
            other => TxError::Application {
                codespace: CODESPACE.to_string(),
                code: other.code(),
                reason: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Balance operations
// =============================================================================

fn balance_key(address: &Address) -> Vec<u8> {
    let mut key = b"balance:".to_vec();
    key.extend_from_slice(address.as_bytes());
    key
}

/// Balance of an account; unknown accounts hold zero.
pub fn get_balance(ctx: &mut ExecutionContext<'_>, address: &Address) -> Result<u64, TxError> {
    Ok(ctx.get_typed(PARTITION, &balance_key(address))?.unwrap_or(0))
}

fn set_balance(ctx: &mut ExecutionContext<'_>, address: &Address, balance: u64) -> Result<(), TxError> {
    if balance == 0 {
        return ctx.delete(PARTITION, balance_key(address));
    }
    ctx.set_typed(PARTITION, balance_key(address), &balance)
}

pub fn add_balance(ctx: &mut ExecutionContext<'_>, address: &Address, amount: u64) -> Result<(), TxError> {
    let balance = get_balance(ctx, address)?
        .checked_add(amount)
        .ok_or(BankError::Overflow(*address))?;
    set_balance(ctx, address, balance)
}

/// Subtract from a balance, failing if it is too small.
pub fn sub_balance(ctx: &mut ExecutionContext<'_>, address: &Address, amount: u64) -> Result<(), TxError> {
    let available = get_balance(ctx, address)?;
    if available < amount {
        return Err(BankError::InsufficientFunds {
            address: *address,
            required: amount,
            available,
        }
        .into());
    }
    set_balance(ctx, address, available - amount)
}

pub fn transfer(
    ctx: &mut ExecutionContext<'_>,
    from: &Address,
    to: &Address,
    amount: u64,
) -> Result<(), TxError> {
    sub_balance(ctx, from, amount)?;
    add_balance(ctx, to, amount)
}

pub fn get_supply(ctx: &mut ExecutionContext<'_>) -> Result<u64, TxError> {
    Ok(ctx.get_typed(PARTITION, SUPPLY_KEY)?.unwrap_or(0))
}

/// Create new coins. Returns the new total supply.
pub fn mint(ctx: &mut ExecutionContext<'_>, to: &Address, amount: u64) -> Result<u64, TxError> {
    let supply = get_supply(ctx)?
        .checked_add(amount)
        .ok_or(BankError::Overflow(*to))?;
    add_balance(ctx, to, amount)?;
    ctx.set_typed(PARTITION, SUPPLY_KEY.to_vec(), &supply)?;
    Ok(supply)
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

impl TypedMessage for MsgSend {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.MsgSend";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSendResponse;

impl TypedMessage for MsgSendResponse {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.MsgSendResponse";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMint {
    pub to: Address,
    pub amount: u64,
}

impl TypedMessage for MsgMint {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.MsgMint";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMintResponse {
    pub supply: u64,
}

impl TypedMessage for MsgMintResponse {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.MsgMintResponse";
}

fn handle_send(ctx: &mut ExecutionContext<'_>, msg: MsgSend) -> Result<MsgSendResponse, TxError> {
    if ctx.caller() != msg.from {
        return Err(BankError::NotOwner {
            signer: ctx.caller(),
            from: msg.from,
        }
        .into());
    }
    if msg.amount == 0 {
        return Err(BankError::ZeroAmount.into());
    }
    transfer(ctx, &msg.from, &msg.to, msg.amount)?;
    ctx.emit_event(
        Event::new("transfer")
            .with_attribute("sender", msg.from)
            .with_attribute("recipient", msg.to)
            .with_attribute("amount", msg.amount),
    );
    Ok(MsgSendResponse)
}

fn handle_mint(ctx: &mut ExecutionContext<'_>, msg: MsgMint) -> Result<MsgMintResponse, TxError> {
    if !ctx.is_consensus_caller() {
        return Err(BankError::MintNotAllowed(ctx.caller()).into());
    }
    if msg.amount == 0 {
        return Err(BankError::ZeroAmount.into());
    }
    let supply = mint(ctx, &msg.to, msg.amount)?;
    ctx.emit_event(
        Event::new("mint")
            .with_attribute("recipient", msg.to)
            .with_attribute("amount", msg.amount),
    );
    Ok(MsgMintResponse { supply })
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBalance {
    pub address: Address,
}

impl TypedMessage for QueryBalance {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.QueryBalance";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBalanceResponse {
    pub address: Address,
    pub balance: u64,
}

impl TypedMessage for QueryBalanceResponse {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.QueryBalanceResponse";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySupply;

impl TypedMessage for QuerySupply {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.QuerySupply";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySupplyResponse {
    pub supply: u64,
}

impl TypedMessage for QuerySupplyResponse {
    const TYPE_URL: &'static str = "/ledgerflow.bank.v1.QuerySupplyResponse";
}

fn query_balance(
    ctx: &mut ExecutionContext<'_>,
    req: QueryBalance,
) -> Result<QueryBalanceResponse, TxError> {
    let balance = get_balance(ctx, &req.address)?;
    Ok(QueryBalanceResponse {
        address: req.address,
        balance,
    })
}

fn query_supply(ctx: &mut ExecutionContext<'_>, _: QuerySupply) -> Result<QuerySupplyResponse, TxError> {
    Ok(QuerySupplyResponse {
        supply: get_supply(ctx)?,
    })
}

/// Register bank messages and queries.
pub fn register<T: Transaction>(builder: &mut StfBuilder<T>) -> Result<(), StfError> {
    let msgs = builder.msg_router_mut();
    msgs.register(handle_send)?;
    msgs.register(handle_mint)?;

    let queries = builder.query_router_mut();
    queries.register(query_balance)?;
    queries.register(query_supply)?;
    Ok(())
}

/// A signed single-transfer transaction.
pub fn transfer_tx(
    from: &Keypair,
    nonce: u64,
    to: Address,
    amount: u64,
    gas_limit: u64,
) -> SignedTx {
    let msg = MsgSend {
        from: from.address(),
        to,
        amount,
    };
    SignedTx::new(from.public_key, nonce, vec![Message::pack(&msg)], gas_limit).signed(from)
}
