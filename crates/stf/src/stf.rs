//! The state-transition engine.
//!
//! [`Stf`] never owns storage. Every operation takes the [`ReaderMap`] it
//! should execute against and hands back the uncommitted [`WriterMap`] (if
//! any); committing is left to the caller.

use crate::cancel::CancelToken;
use crate::context::{ExecEnv, ExecMode, ExecutionContext};
use crate::error::{Result, StfError, TxError};
use crate::gas::{GasConfig, GasMeter};
use crate::hooks::{BlockHooks, TxValidator};
use crate::result::{BlockResponse, TxResult};
use crate::router::MsgRouter;
use ledgerflow_core::{Address, BlockRequest, Event, HeaderInfo, Message, Transaction, TransactionError};
use ledgerflow_storage::{ReaderMap, WriterMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What sims delivery does when a generated transaction hits a fatal error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimsFailurePolicy {
    /// Abort the whole run, like block delivery.
    #[default]
    Abort,
    /// Record a failed result and keep generating. Cancellation still aborts.
    Skip,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StfConfig {
    /// Chain id of the headers built for calls outside block delivery.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chain_id: String,
    pub gas: GasConfig,
    /// Caller identity of hooks, generators and other system calls.
    pub consensus_identity: Address,
    /// Upper bound on the summed gas limits of a block. `0` disables it.
    pub max_block_gas: u64,
    pub sims_failure_policy: SimsFailurePolicy,
}

impl Default for StfConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            gas: GasConfig::default(),
            consensus_identity: Address::from_label("consensus"),
            max_block_gas: 0,
            sims_failure_policy: SimsFailurePolicy::Abort,
        }
    }
}

/// How far a transaction is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxStage {
    ValidateOnly,
    Full,
}

#[derive(Debug, Clone, Copy)]
enum HookStage {
    Begin,
    End,
}

impl HookStage {
    fn name(self) -> &'static str {
        match self {
            HookStage::Begin => "begin_block",
            HookStage::End => "end_block",
        }
    }
}

/// Deterministic state-transition engine over transactions of type `T`.
pub struct Stf<T: Transaction> {
    config: StfConfig,
    msg_router: MsgRouter,
    query_router: MsgRouter,
    validators: Vec<Box<dyn TxValidator<T>>>,
    hooks: Vec<Box<dyn BlockHooks>>,
}

impl<T: Transaction> Stf<T> {
    pub fn builder() -> StfBuilder<T> {
        StfBuilder::new()
    }

    pub fn config(&self) -> &StfConfig {
        &self.config
    }

    pub fn msg_router(&self) -> &MsgRouter {
        &self.msg_router
    }

    pub fn query_router(&self) -> &MsgRouter {
        &self.query_router
    }

    /// Header seen by calls outside block delivery: the block that would
    /// follow `reader`.
    fn pending_header(&self, reader: &dyn ReaderMap) -> HeaderInfo {
        HeaderInfo::at_height(self.config.chain_id.clone(), reader.version() + 1)
    }

    pub(crate) fn env<'a>(&'a self, header: &'a HeaderInfo, cancel: &'a CancelToken) -> ExecEnv<'a> {
        ExecEnv {
            header,
            gas_config: &self.config.gas,
            consensus_identity: self.config.consensus_identity,
            cancel,
        }
    }

    // =========================================================================
    // Admission and dry runs
    // =========================================================================

    /// Run only the transaction's validation logic on a throwaway branch.
    ///
    /// `gas_limit == 0` uses the limit declared by the transaction.
    pub fn validate_tx(
        &self,
        reader: Arc<dyn ReaderMap>,
        gas_limit: u64,
        tx: &T,
        cancel: &CancelToken,
    ) -> Result<TxResult> {
        let header = self.pending_header(reader.as_ref());
        let mut writer = WriterMap::new(reader);
        let env = self.env(&header, cancel);
        self.execute_tx(
            &mut writer,
            env,
            ExecMode::Finalize,
            tx,
            effective_limit(gas_limit, tx),
            TxStage::ValidateOnly,
        )
    }

    /// Execute the transaction in simulate mode and return its would-be
    /// effects alongside the result. Nothing is ever committed.
    pub fn simulate(
        &self,
        reader: Arc<dyn ReaderMap>,
        gas_limit: u64,
        tx: &T,
        cancel: &CancelToken,
    ) -> Result<(TxResult, WriterMap)> {
        let header = self.pending_header(reader.as_ref());
        let mut writer = WriterMap::new(reader);
        let env = self.env(&header, cancel);
        let result = self.execute_tx(
            &mut writer,
            env,
            ExecMode::Simulate,
            tx,
            effective_limit(gas_limit, tx),
            TxStage::Full,
        )?;
        Ok((result, writer))
    }

    /// Answer a read-only request. `gas_limit == 0` means unbounded.
    pub fn query(
        &self,
        reader: Arc<dyn ReaderMap>,
        gas_limit: u64,
        request: &Message,
        cancel: &CancelToken,
    ) -> Result<Message> {
        if cancel.is_cancelled() {
            return Err(StfError::Cancelled);
        }
        let header = self.pending_header(reader.as_ref());
        let mut writer = WriterMap::new(reader);
        let env = self.env(&header, cancel);
        let mut ctx = ExecutionContext::new(
            &mut writer,
            env,
            ExecMode::Query,
            Address::ZERO,
            GasMeter::with_limit_or_infinite(gas_limit),
        );
        Ok(self.query_router.dispatch(&mut ctx, request)?)
    }

    // =========================================================================
    // Direct state access
    // =========================================================================

    /// Run `f` on a fresh branch over `reader`, as the consensus identity,
    /// and return its result with the branch it produced.
    pub fn run_with_ctx<R, F>(
        &self,
        reader: Arc<dyn ReaderMap>,
        cancel: &CancelToken,
        f: F,
    ) -> Result<(R, WriterMap)>
    where
        F: FnOnce(&mut ExecutionContext<'_>) -> std::result::Result<R, TxError>,
    {
        let header = self.pending_header(reader.as_ref());
        self.run_with_ctx_on(WriterMap::new(reader), &header, cancel, f)
    }

    /// [`Stf::run_with_ctx`] on an existing writer and header.
    pub fn run_with_ctx_on<R, F>(
        &self,
        mut writer: WriterMap,
        header: &HeaderInfo,
        cancel: &CancelToken,
        f: F,
    ) -> Result<(R, WriterMap)>
    where
        F: FnOnce(&mut ExecutionContext<'_>) -> std::result::Result<R, TxError>,
    {
        if cancel.is_cancelled() {
            return Err(StfError::Cancelled);
        }
        let env = self.env(header, cancel);
        let value = {
            let mut ctx = ExecutionContext::new(
                &mut writer,
                env,
                ExecMode::Finalize,
                env.consensus_identity,
                GasMeter::infinite(),
            );
            f(&mut ctx)?
        };
        Ok((value, writer))
    }

    // =========================================================================
    // Block delivery
    // =========================================================================

    /// Deliver a block on a fresh writer over `reader`.
    pub fn deliver_block(
        &self,
        block: &BlockRequest<T>,
        reader: Arc<dyn ReaderMap>,
        cancel: &CancelToken,
    ) -> Result<(BlockResponse, WriterMap)> {
        self.deliver_block_with(block, WriterMap::new(reader), cancel)
    }

    /// Deliver a block on top of `writer`'s pending writes.
    ///
    /// Transactions run strictly in order, each on its own branch; failed
    /// ones are recorded and dropped, fatal errors abort the block and
    /// discard every write.
    #[instrument(skip_all, fields(height = block.header.height, txs = block.txs.len()))]
    pub fn deliver_block_with(
        &self,
        block: &BlockRequest<T>,
        mut writer: WriterMap,
        cancel: &CancelToken,
    ) -> Result<(BlockResponse, WriterMap)> {
        if cancel.is_cancelled() {
            return Err(StfError::Cancelled);
        }
        if self.config.max_block_gas > 0 && block.total_gas_limit() > self.config.max_block_gas {
            warn!(
                total = block.total_gas_limit(),
                max = self.config.max_block_gas,
                "Block exceeds gas limit"
            );
            return Err(StfError::MalformedBlock(format!(
                "declared gas {} exceeds block limit {}",
                block.total_gas_limit(),
                self.config.max_block_gas
            )));
        }

        let env = self.env(&block.header, cancel);
        let begin_block_events = self.run_block_hooks(&mut writer, env, HookStage::Begin)?;

        let mut tx_results = Vec::with_capacity(block.txs.len());
        for tx in &block.txs {
            let result = self
                .execute_tx(&mut writer, env, ExecMode::Finalize, tx, tx.gas_limit(), TxStage::Full)
                .inspect_err(|err| warn!(tx = %tx.hash(), error = %err, "Block aborted"))?;
            tx_results.push(result);
        }

        let end_block_events = self.run_block_hooks(&mut writer, env, HookStage::End)?;

        let response = BlockResponse {
            height: block.header.height,
            txs_hash: block.txs_hash(),
            begin_block_events,
            tx_results,
            end_block_events,
        };
        info!(
            txs_hash = %response.txs_hash,
            gas_used = response.gas_used(),
            failed = response.failed_count(),
            "Delivered block"
        );
        Ok((response, writer))
    }

    fn run_block_hooks(
        &self,
        writer: &mut WriterMap,
        env: ExecEnv<'_>,
        stage: HookStage,
    ) -> Result<Vec<Event>> {
        let mut ctx = ExecutionContext::new(
            writer,
            env,
            ExecMode::Finalize,
            env.consensus_identity,
            GasMeter::infinite(),
        );
        for hook in &self.hooks {
            let outcome = match stage {
                HookStage::Begin => hook.begin_block(&mut ctx),
                HookStage::End => hook.end_block(&mut ctx),
            };
            outcome.map_err(|err| {
                if err.is_fatal() {
                    StfError::from(err)
                } else {
                    StfError::BlockHook {
                        stage: stage.name(),
                        reason: err.to_string(),
                    }
                }
            })?;
        }
        Ok(ctx.finish().1)
    }

    pub(crate) fn begin_block_events(&self, writer: &mut WriterMap, env: ExecEnv<'_>) -> Result<Vec<Event>> {
        self.run_block_hooks(writer, env, HookStage::Begin)
    }

    pub(crate) fn end_block_events(&self, writer: &mut WriterMap, env: ExecEnv<'_>) -> Result<Vec<Event>> {
        self.run_block_hooks(writer, env, HookStage::End)
    }

    // =========================================================================
    // Single transaction
    // =========================================================================

    /// Run one transaction on a fresh branch of `writer`, folding the branch
    /// in on success and dropping it on failure. Only fatal errors escape.
    pub(crate) fn execute_tx(
        &self,
        writer: &mut WriterMap,
        env: ExecEnv<'_>,
        mode: ExecMode,
        tx: &T,
        gas_limit: u64,
        stage: TxStage,
    ) -> Result<TxResult> {
        if env.cancel.is_cancelled() {
            return Err(StfError::Cancelled);
        }
        let gas_wanted = tx.gas_limit();

        let caller = match tx.signers() {
            Ok(signers) => match signers.first() {
                Some(caller) => *caller,
                None => {
                    let err = TxError::InvalidTx(TransactionError::NoSigners);
                    return Ok(TxResult::failure(gas_wanted, 0, &err));
                }
            },
            Err(err) => return Ok(TxResult::failure(gas_wanted, 0, &err.into())),
        };

        writer.branch();
        let (outcome, gas_used, events) = {
            let mut ctx = ExecutionContext::new(writer, env, mode, caller, GasMeter::new(gas_limit));
            let outcome = self.run_tx(&mut ctx, tx, stage);
            let (gas_used, events) = ctx.finish();
            (outcome, gas_used, events)
        };

        match outcome {
            Ok(responses) => {
                writer.commit_branch()?;
                Ok(TxResult::success(gas_wanted, gas_used, events, responses))
            }
            Err(err) => {
                writer.discard_branch()?;
                if err.is_fatal() {
                    return Err(err.into());
                }
                debug!(tx = %tx.hash(), %mode, error = %err, "Transaction failed");
                Ok(TxResult::failure(gas_wanted, gas_used, &err))
            }
        }
    }

    fn run_tx(
        &self,
        ctx: &mut ExecutionContext<'_>,
        tx: &T,
        stage: TxStage,
    ) -> std::result::Result<Vec<Message>, TxError> {
        let messages = tx.messages()?;
        for validator in &self.validators {
            validator.validate(ctx, tx)?;
        }
        if stage == TxStage::ValidateOnly {
            return Ok(Vec::new());
        }

        let mut responses = Vec::with_capacity(messages.len());
        for msg in messages {
            ctx.check_cancelled()?;
            responses.push(self.msg_router.dispatch(ctx, msg)?);
        }
        Ok(responses)
    }
}

impl<T: Transaction> std::fmt::Debug for Stf<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stf")
            .field("config", &self.config)
            .field("messages", &self.msg_router)
            .field("queries", &self.query_router)
            .field("validators", &self.validators.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

fn effective_limit<T: Transaction>(cap: u64, tx: &T) -> u64 {
    if cap == 0 {
        tx.gas_limit()
    } else {
        cap
    }
}

/// Assembles an [`Stf`].
pub struct StfBuilder<T: Transaction> {
    config: StfConfig,
    msg_router: MsgRouter,
    query_router: MsgRouter,
    validators: Vec<Box<dyn TxValidator<T>>>,
    hooks: Vec<Box<dyn BlockHooks>>,
}

impl<T: Transaction> StfBuilder<T> {
    pub fn new() -> Self {
        Self {
            config: StfConfig::default(),
            msg_router: MsgRouter::new(),
            query_router: MsgRouter::new(),
            validators: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn config(mut self, config: StfConfig) -> Self {
        self.config = config;
        self
    }

    /// Validators run in the order they are added.
    pub fn validator(mut self, validator: impl TxValidator<T> + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Hooks run in the order they are added.
    pub fn hooks(mut self, hooks: impl BlockHooks + 'static) -> Self {
        self.hooks.push(Box::new(hooks));
        self
    }

    pub fn msg_router_mut(&mut self) -> &mut MsgRouter {
        &mut self.msg_router
    }

    pub fn query_router_mut(&mut self) -> &mut MsgRouter {
        &mut self.query_router
    }

    pub fn build(self) -> Stf<T> {
        Stf {
            config: self.config,
            msg_router: self.msg_router,
            query_router: self.query_router,
            validators: self.validators,
            hooks: self.hooks,
        }
    }
}

impl<T: Transaction> Default for StfBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
