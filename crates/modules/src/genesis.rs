//! Initial chain state.

use crate::bank;
use ledgerflow_core::Address;
use ledgerflow_stf::{ExecutionContext, TxError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("invalid genesis json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("account {0} listed twice")]
    DuplicateAccount(Address),

    #[error("chain id must not be empty")]
    EmptyChainId,
}

/// A funded account at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    #[serde(with = "address_hex")]
    pub address: Address,
    pub balance: u64,
}

/// Genesis document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    pub chain_id: String,
    pub accounts: Vec<GenesisAccount>,
}

impl GenesisState {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            accounts: Vec::new(),
        }
    }

    pub fn with_account(mut self, address: Address, balance: u64) -> Self {
        self.accounts.push(GenesisAccount { address, balance });
        self
    }

    pub fn from_json(json: &str) -> Result<Self, GenesisError> {
        let genesis: Self = serde_json::from_str(json)?;
        genesis.validate()?;
        Ok(genesis)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("serialization should not fail")
    }

    pub fn validate(&self) -> Result<(), GenesisError> {
        if self.chain_id.is_empty() {
            return Err(GenesisError::EmptyChainId);
        }
        let mut seen = BTreeSet::new();
        for account in &self.accounts {
            if !seen.insert(account.address) {
                return Err(GenesisError::DuplicateAccount(account.address));
            }
        }
        Ok(())
    }

    pub fn total_supply(&self) -> u64 {
        self.accounts
            .iter()
            .fold(0u64, |acc, a| acc.saturating_add(a.balance))
    }

    /// Mint every genesis balance. Must run as the consensus identity.
    pub fn apply(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), TxError> {
        if !ctx.is_consensus_caller() {
            return Err(bank::BankError::MintNotAllowed(ctx.caller()).into());
        }
        for account in self.accounts.iter().filter(|a| a.balance > 0) {
            bank::mint(ctx, &account.address, account.balance)?;
        }
        Ok(())
    }
}

mod address_hex {
    use ledgerflow_core::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&address.to_hex())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
