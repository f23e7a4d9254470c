//! Outcome records produced by the engine.

use crate::error::TxError;
use ledgerflow_core::{Event, Hash, Message};
use serde::{Deserialize, Serialize};

/// Why a transaction failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFailure {
    pub codespace: String,
    pub code: u32,
    pub reason: String,
}

/// Outcome of one transaction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// Gas limit the transaction declared.
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// Empty when the transaction failed.
    pub events: Vec<Event>,
    /// One response per message, in message order.
    pub responses: Vec<Message>,
    pub error: Option<TxFailure>,
}

impl TxResult {
    pub fn success(gas_wanted: u64, gas_used: u64, events: Vec<Event>, responses: Vec<Message>) -> Self {
        Self {
            gas_wanted,
            gas_used,
            events,
            responses,
            error: None,
        }
    }

    pub fn failure(gas_wanted: u64, gas_used: u64, error: &TxError) -> Self {
        Self {
            gas_wanted,
            gas_used,
            events: Vec::new(),
            responses: Vec::new(),
            error: Some(error.to_failure()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Failure code, if any.
    pub fn code(&self) -> Option<(&str, u32)> {
        self.error
            .as_ref()
            .map(|failure| (failure.codespace.as_str(), failure.code))
    }
}

/// Outcome of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResponse {
    pub height: u64,
    /// Order-sensitive digest of the delivered transaction hashes.
    pub txs_hash: Hash,
    pub begin_block_events: Vec<Event>,
    /// One result per transaction, in delivery order.
    pub tx_results: Vec<TxResult>,
    pub end_block_events: Vec<Event>,
}

impl BlockResponse {
    pub fn gas_used(&self) -> u64 {
        self.tx_results
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.gas_used))
    }

    pub fn failed_count(&self) -> usize {
        self.tx_results.iter().filter(|r| !r.is_ok()).count()
    }
}
