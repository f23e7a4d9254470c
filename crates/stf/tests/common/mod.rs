#![allow(dead_code)]

//! A small counter application used by the engine tests.

use ledgerflow_core::{
    hash, Address, BlockRequest, Event, Hash, HeaderInfo, Message, Transaction, TransactionError,
    TypedMessage,
};
use ledgerflow_stf::{
    BlockHooks, ExecutionContext, Stf, StfConfig, TxError, TxValidator,
};
use ledgerflow_storage::{ChangeSet, ReaderMap, Snapshot, StoreError, WriterMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const COUNTER: &str = "counter";
pub const SEEN: &str = "seen";
pub const META: &str = "meta";
pub const POISON: &str = "poison";

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTx {
    pub sender: Option<Address>,
    pub msgs: Vec<Message>,
    pub gas_limit: u64,
}

impl Transaction for TestTx {
    fn hash(&self) -> Hash {
        hash(&self.encode())
    }

    fn signers(&self) -> Result<Vec<Address>, TransactionError> {
        self.sender
            .map(|sender| vec![sender])
            .ok_or(TransactionError::NoSigners)
    }

    fn messages(&self) -> Result<&[Message], TransactionError> {
        if self.msgs.is_empty() {
            return Err(TransactionError::NoMessages);
        }
        Ok(&self.msgs)
    }

    fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap()
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgAdd {
    pub key: String,
    pub amount: u64,
}

impl TypedMessage for MsgAdd {
    const TYPE_URL: &'static str = "/counter.MsgAdd";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgSub {
    pub key: String,
    pub amount: u64,
}

impl TypedMessage for MsgSub {
    const TYPE_URL: &'static str = "/counter.MsgSub";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: u64,
}

impl TypedMessage for ValueResponse {
    const TYPE_URL: &'static str = "/counter.ValueResponse";
}

/// Reads the poison partition, which failing readers refuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgPoison;

impl TypedMessage for MsgPoison {
    const TYPE_URL: &'static str = "/counter.MsgPoison";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgMode;

impl TypedMessage for MsgMode {
    const TYPE_URL: &'static str = "/counter.MsgMode";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeResponse {
    pub mode: String,
    pub consensus: bool,
}

impl TypedMessage for ModeResponse {
    const TYPE_URL: &'static str = "/counter.ModeResponse";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryValue {
    pub key: String,
}

impl TypedMessage for QueryValue {
    const TYPE_URL: &'static str = "/counter.QueryValue";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHeader;

impl TypedMessage for QueryHeader {
    const TYPE_URL: &'static str = "/counter.QueryHeader";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderResponse {
    pub header: HeaderInfo,
}

impl TypedMessage for HeaderResponse {
    const TYPE_URL: &'static str = "/counter.HeaderResponse";
}

fn read_counter(ctx: &mut ExecutionContext<'_>, key: &str) -> Result<u64, TxError> {
    Ok(ctx.get_typed(COUNTER, key.as_bytes())?.unwrap_or(0))
}

fn handle_add(ctx: &mut ExecutionContext<'_>, msg: MsgAdd) -> Result<ValueResponse, TxError> {
    let value = read_counter(ctx, &msg.key)? + msg.amount;
    ctx.set_typed(COUNTER, msg.key.as_bytes().to_vec(), &value)?;
    ctx.emit_event(Event::new("add").with_attribute("key", &msg.key));
    Ok(ValueResponse { value })
}

fn handle_sub(ctx: &mut ExecutionContext<'_>, msg: MsgSub) -> Result<ValueResponse, TxError> {
    let current = read_counter(ctx, &msg.key)?;
    let value = current.checked_sub(msg.amount).ok_or(TxError::Application {
        codespace: "counter".into(),
        code: 1,
        reason: format!("{} is only {}", msg.key, current),
    })?;
    ctx.set_typed(COUNTER, msg.key.as_bytes().to_vec(), &value)?;
    Ok(ValueResponse { value })
}

fn handle_poison(ctx: &mut ExecutionContext<'_>, _: MsgPoison) -> Result<ValueResponse, TxError> {
    ctx.get(POISON, b"any")?;
    Ok(ValueResponse { value: 0 })
}

fn handle_mode(ctx: &mut ExecutionContext<'_>, _: MsgMode) -> Result<ModeResponse, TxError> {
    Ok(ModeResponse {
        mode: ctx.mode().to_string(),
        consensus: ctx.is_consensus_caller(),
    })
}

fn query_value(ctx: &mut ExecutionContext<'_>, req: QueryValue) -> Result<ValueResponse, TxError> {
    match ctx.get_typed(COUNTER, req.key.as_bytes())? {
        Some(value) => Ok(ValueResponse { value }),
        None => Err(TxError::NotFound(req.key)),
    }
}

fn query_header(ctx: &mut ExecutionContext<'_>, _: QueryHeader) -> Result<HeaderResponse, TxError> {
    Ok(HeaderResponse {
        header: ctx.header().clone(),
    })
}

// =============================================================================
// Validator and hooks
// =============================================================================

/// Rejects the `banned` account and counts validated txs per sender.
pub struct SeenValidator;

impl TxValidator<TestTx> for SeenValidator {
    fn validate(&self, ctx: &mut ExecutionContext<'_>, _tx: &TestTx) -> Result<(), TxError> {
        let caller = ctx.caller();
        if caller == Address::from_label("banned") {
            return Err(TxError::Unauthorized(format!("{} is banned", caller)));
        }
        let seen: u64 = ctx.get_typed(SEEN, caller.as_bytes())?.unwrap_or(0);
        ctx.set_typed(SEEN, caller.as_bytes().to_vec(), &(seen + 1))
    }
}

/// Records the block height and brackets each block with events.
pub struct HeightHooks;

impl BlockHooks for HeightHooks {
    fn begin_block(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), TxError> {
        let height = ctx.header().height;
        ctx.set_typed(META, b"height".to_vec(), &height)?;
        ctx.emit_event(Event::new("begin_block").with_attribute("height", height));
        Ok(())
    }

    fn end_block(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), TxError> {
        ctx.emit_event(Event::new("end_block"));
        Ok(())
    }
}

pub struct FailingHooks;

impl BlockHooks for FailingHooks {
    fn end_block(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), TxError> {
        Err(TxError::InvalidRequest("end block refused".into()))
    }
}

// =============================================================================
// Readers
// =============================================================================

/// Serves a snapshot but fails every read of the poison partition.
pub struct PoisonedReader(pub Snapshot);

impl ReaderMap for PoisonedReader {
    fn version(&self) -> u64 {
        self.0.version()
    }

    fn get(&self, partition: &str, key: &[u8]) -> ledgerflow_storage::Result<Option<Vec<u8>>> {
        if partition == POISON {
            return Err(StoreError::Unavailable("poisoned partition".into()));
        }
        self.0.get(partition, key)
    }
}

/// A reader whose backing store is gone.
pub struct UnavailableReader;

impl ReaderMap for UnavailableReader {
    fn version(&self) -> u64 {
        1
    }

    fn get(&self, _partition: &str, _key: &[u8]) -> ledgerflow_storage::Result<Option<Vec<u8>>> {
        Err(StoreError::Unavailable("disk detached".into()))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn app() -> Stf<TestTx> {
    app_with(StfConfig::default())
}

pub fn app_with(config: StfConfig) -> Stf<TestTx> {
    let mut builder = Stf::builder()
        .config(config)
        .validator(SeenValidator)
        .hooks(HeightHooks);
    let msgs = builder.msg_router_mut();
    msgs.register(handle_add).unwrap();
    msgs.register(handle_sub).unwrap();
    msgs.register(handle_poison).unwrap();
    msgs.register(handle_mode).unwrap();
    let queries = builder.query_router_mut();
    queries.register(query_value).unwrap();
    queries.register(query_header).unwrap();
    builder.build()
}

pub fn add(key: &str, amount: u64) -> Message {
    Message::pack(&MsgAdd {
        key: key.into(),
        amount,
    })
}

pub fn sub(key: &str, amount: u64) -> Message {
    Message::pack(&MsgSub {
        key: key.into(),
        amount,
    })
}

pub fn tx(sender: &str, msgs: Vec<Message>) -> TestTx {
    TestTx {
        sender: Some(Address::from_label(sender)),
        msgs,
        gas_limit: 1_000_000,
    }
}

pub fn block(height: u64, txs: Vec<TestTx>) -> BlockRequest<TestTx> {
    BlockRequest::new(HeaderInfo::at_height("test-chain", height), txs)
}

/// Snapshot at version 1 holding the given counters.
pub fn seeded(counters: &[(&str, u64)]) -> Snapshot {
    let mut changes = ChangeSet::default();
    for (key, value) in counters {
        changes.set(
            COUNTER,
            key.as_bytes().to_vec(),
            bincode::serialize(value).unwrap(),
        );
    }
    Snapshot::empty().apply(1, &changes)
}

pub fn reader(counters: &[(&str, u64)]) -> Arc<dyn ReaderMap> {
    Arc::new(seeded(counters))
}

pub fn counter(writer: &WriterMap, key: &str) -> Option<u64> {
    writer
        .get(COUNTER, key.as_bytes())
        .unwrap()
        .map(|bytes| bincode::deserialize(&bytes).unwrap())
}

pub fn seen(writer: &WriterMap, sender: &str) -> Option<u64> {
    writer
        .get(SEEN, Address::from_label(sender).as_bytes())
        .unwrap()
        .map(|bytes| bincode::deserialize(&bytes).unwrap())
}
