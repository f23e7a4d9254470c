//! Block requests handed to the engine by the consensus driver.

use crate::crypto::Address;
use crate::hash::{Digest, Hash};
use crate::transaction::Transaction;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Header information visible to transaction logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub chain_id: String,
    pub height: u64,
    /// Agreed block time. Never the local clock.
    pub time: DateTime<Utc>,
    pub proposer: Address,
}

impl HeaderInfo {
    pub fn new(chain_id: impl Into<String>, height: u64, time: DateTime<Utc>, proposer: Address) -> Self {
        Self {
            chain_id: chain_id.into(),
            height,
            time,
            proposer,
        }
    }

    /// Header at `height` with a block time derived from it, for fixtures
    /// and synthetic runs that must be reproducible.
    pub fn at_height(chain_id: impl Into<String>, height: u64) -> Self {
        let time = Utc
            .timestamp_opt(1_700_000_000 + height as i64 * 5, 0)
            .single()
            .unwrap_or_default();
        Self::new(chain_id, height, time, Address::ZERO)
    }
}

impl Default for HeaderInfo {
    fn default() -> Self {
        Self::at_height("", 0)
    }
}

/// An agreed block: header plus transactions in their canonical order.
#[derive(Debug, Clone)]
pub struct BlockRequest<T> {
    pub header: HeaderInfo,
    pub txs: Vec<T>,
}

impl<T: Transaction> BlockRequest<T> {
    pub fn new(header: HeaderInfo, txs: Vec<T>) -> Self {
        Self { header, txs }
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Sum of declared gas limits, saturating.
    pub fn total_gas_limit(&self) -> u64 {
        self.txs
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.gas_limit()))
    }

    /// Order-sensitive digest of the transaction hashes.
    pub fn txs_hash(&self) -> Hash {
        let hashes: Vec<Hash> = self.txs.iter().map(|tx| tx.hash()).collect();
        txs_digest(&hashes)
    }
}

/// Digest of transaction hashes in delivery order.
pub fn txs_digest(hashes: &[Hash]) -> Hash {
    let mut digest = Digest::new();
    for hash in hashes {
        digest.field(hash.as_ref());
    }
    digest.finish()
}
