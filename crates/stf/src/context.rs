//! Per-call execution context.
//!
//! An [`ExecutionContext`] is everything a handler may touch: one branch of
//! pending state, a gas meter, the header, the caller identity and an event
//! log. There is no other ambient state.

use crate::cancel::CancelToken;
use crate::error::TxError;
use crate::gas::{GasConfig, GasMeter};
use ledgerflow_core::{Address, Event, HeaderInfo};
use ledgerflow_storage::{StoreError, WriterMap};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution mode of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecMode {
    /// Block delivery; successful writes are kept.
    Finalize,
    /// Dry run of a transaction; writes are never committed.
    Simulate,
    /// Read-only request.
    Query,
    /// Synthetic transaction generation for sims.
    SimTxGen,
}

impl ExecMode {
    /// Whether writes made in this mode may reach committed state.
    pub fn is_finalize(self) -> bool {
        matches!(self, ExecMode::Finalize)
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecMode::Finalize => "finalize",
            ExecMode::Simulate => "simulate",
            ExecMode::Query => "query",
            ExecMode::SimTxGen => "sim_tx_gen",
        };
        f.write_str(name)
    }
}

/// Read-only inputs shared by every context of one engine call.
#[derive(Debug, Clone, Copy)]
pub struct ExecEnv<'a> {
    pub header: &'a HeaderInfo,
    pub gas_config: &'a GasConfig,
    pub consensus_identity: Address,
    pub cancel: &'a CancelToken,
}

/// Ambient state for one transaction, query, hook or closure.
pub struct ExecutionContext<'a> {
    store: &'a mut WriterMap,
    env: ExecEnv<'a>,
    mode: ExecMode,
    caller: Address,
    gas: GasMeter,
    events: Vec<Event>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        store: &'a mut WriterMap,
        env: ExecEnv<'a>,
        mode: ExecMode,
        caller: Address,
        gas: GasMeter,
    ) -> Self {
        Self {
            store,
            env,
            mode,
            caller,
            gas,
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Ambient info
    // =========================================================================

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn header(&self) -> &HeaderInfo {
        self.env.header
    }

    /// Identity on whose behalf the current call runs.
    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn consensus_identity(&self) -> Address {
        self.env.consensus_identity
    }

    /// Whether the call was originated by the system rather than a user.
    pub fn is_consensus_caller(&self) -> bool {
        self.caller == self.env.consensus_identity
    }

    pub fn check_cancelled(&self) -> Result<(), TxError> {
        if self.env.cancel.is_cancelled() {
            return Err(TxError::Cancelled);
        }
        Ok(())
    }

    // =========================================================================
    // Gas
    // =========================================================================

    pub fn consume_gas(&mut self, amount: u64) -> Result<(), TxError> {
        self.gas.consume(amount)
    }

    pub fn gas_used(&self) -> u64 {
        self.gas.used()
    }

    pub fn gas_remaining(&self) -> u64 {
        self.gas.remaining()
    }

    pub fn gas_config(&self) -> &GasConfig {
        self.env.gas_config
    }

    // =========================================================================
    // Store access (metered)
    // =========================================================================

    pub fn get(&mut self, partition: &str, key: &[u8]) -> Result<Option<Vec<u8>>, TxError> {
        self.check_cancelled()?;
        let value = self.store.get(partition, key)?;
        let len = value.as_ref().map_or(0, Vec::len);
        self.gas.consume(self.env.gas_config.read_cost(len))?;
        Ok(value)
    }

    pub fn has(&mut self, partition: &str, key: &[u8]) -> Result<bool, TxError> {
        self.check_cancelled()?;
        self.gas.consume(self.env.gas_config.has_cost)?;
        Ok(self.store.has(partition, key)?)
    }

    pub fn set(&mut self, partition: &str, key: Vec<u8>, value: Vec<u8>) -> Result<(), TxError> {
        self.check_cancelled()?;
        self.gas
            .consume(self.env.gas_config.write_cost(key.len() + value.len()))?;
        self.store.set(partition, key, value);
        Ok(())
    }

    pub fn delete(&mut self, partition: &str, key: Vec<u8>) -> Result<(), TxError> {
        self.check_cancelled()?;
        self.gas.consume(self.env.gas_config.delete_cost)?;
        self.store.delete(partition, key);
        Ok(())
    }

    /// Read and bincode-decode a value.
    pub fn get_typed<V: DeserializeOwned>(
        &mut self,
        partition: &str,
        key: &[u8],
    ) -> Result<Option<V>, TxError> {
        match self.get(partition, key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes).map_err(StoreError::from)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Bincode-encode and write a value.
    pub fn set_typed<V: Serialize>(
        &mut self,
        partition: &str,
        key: Vec<u8>,
        value: &V,
    ) -> Result<(), TxError> {
        let bytes = bincode::serialize(value).map_err(StoreError::from)?;
        self.set(partition, key, bytes)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn emit_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // =========================================================================
    // Nested branches
    // =========================================================================

    /// Run `f` on a nested branch: its writes and events are kept if it
    /// returns `Ok` and dropped if it returns `Err`. Gas is charged either
    /// way.
    pub fn branch<R, F>(&mut self, f: F) -> Result<R, TxError>
    where
        F: FnOnce(&mut ExecutionContext<'a>) -> Result<R, TxError>,
    {
        let events_before = self.events.len();
        self.store.branch();
        match f(self) {
            Ok(value) => {
                self.store.commit_branch()?;
                Ok(value)
            }
            Err(err) => {
                self.store.discard_branch()?;
                self.events.truncate(events_before);
                Err(err)
            }
        }
    }

    /// Gas used and events emitted, consuming the context.
    pub fn finish(self) -> (u64, Vec<Event>) {
        (self.gas.used(), self.events)
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("mode", &self.mode)
            .field("height", &self.env.header.height)
            .field("caller", &self.caller)
            .field("gas", &self.gas)
            .field("events", &self.events.len())
            .finish()
    }
}
