//! Random transfer workload for sims delivery.

use crate::{auth, bank};
use ledgerflow_core::{Keypair, SignedTx};
use ledgerflow_stf::{ExecutionContext, TxError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic keypairs `0..count`, used as sims accounts.
pub fn sim_accounts(count: usize) -> Vec<Keypair> {
    (0..count as u64).map(Keypair::from_seed).collect()
}

/// Generates signed transfers between a fixed set of accounts.
///
/// Nonces and balances are read from the state the generator is handed, so
/// every generated transaction is built against the effects of the ones
/// delivered before it.
pub struct TransferGenerator {
    accounts: Vec<Keypair>,
    rng: StdRng,
    remaining: u64,
    max_amount: u64,
    gas_limit: u64,
}

impl TransferGenerator {
    pub fn new(accounts: Vec<Keypair>, seed: u64, count: u64) -> Self {
        Self {
            accounts,
            rng: StdRng::seed_from_u64(seed),
            remaining: count,
            max_amount: 1_000,
            gas_limit: 200_000,
        }
    }

    pub fn with_max_amount(mut self, max_amount: u64) -> Self {
        self.max_amount = max_amount.max(1);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn next_tx(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Option<SignedTx>, TxError> {
        if self.remaining == 0 || self.accounts.len() < 2 {
            return Ok(None);
        }
        self.remaining -= 1;

        let from_idx = self.rng.gen_range(0..self.accounts.len());
        let mut to_idx = self.rng.gen_range(0..self.accounts.len() - 1);
        if to_idx >= from_idx {
            to_idx += 1;
        }
        let from = &self.accounts[from_idx];
        let to = self.accounts[to_idx].address();

        let nonce = auth::get_nonce(ctx, &from.address())?.unwrap_or(0);
        let balance = bank::get_balance(ctx, &from.address())?;
        // an empty account still sends, and fails with insufficient funds
        let amount = match balance.min(self.max_amount) {
            0 => 1,
            cap => self.rng.gen_range(1..=cap),
        };

        Ok(Some(bank::transfer_tx(from, nonce, to, amount, self.gas_limit)))
    }

    /// Adapt into the closure shape sims delivery expects.
    pub fn into_fn(
        mut self,
    ) -> impl FnMut(&mut ExecutionContext<'_>) -> Result<Option<SignedTx>, TxError> {
        move |ctx| self.next_tx(ctx)
    }
}
