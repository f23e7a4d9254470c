//! Gas metering.

use crate::error::TxError;
use serde::{Deserialize, Serialize};

/// Gas charged for store access from inside an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConfig {
    pub has_cost: u64,
    pub delete_cost: u64,
    pub read_cost_flat: u64,
    pub read_cost_per_byte: u64,
    pub write_cost_flat: u64,
    pub write_cost_per_byte: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
        }
    }
}

impl GasConfig {
    /// A config that charges nothing.
    pub fn free() -> Self {
        Self {
            has_cost: 0,
            delete_cost: 0,
            read_cost_flat: 0,
            read_cost_per_byte: 0,
            write_cost_flat: 0,
            write_cost_per_byte: 0,
        }
    }

    /// Cost of reading a value of `len` bytes.
    pub fn read_cost(&self, len: usize) -> u64 {
        self.read_cost_flat
            .saturating_add(self.read_cost_per_byte.saturating_mul(len as u64))
    }

    /// Cost of writing `len` bytes of key and value.
    pub fn write_cost(&self, len: usize) -> u64 {
        self.write_cost_flat
            .saturating_add(self.write_cost_per_byte.saturating_mul(len as u64))
    }
}

/// Gas meter tracks consumption against a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    /// `None` for an unbounded meter.
    limit: Option<u64>,
    used: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            used: 0,
        }
    }

    /// Meter without a limit, for queries and system contexts.
    pub fn infinite() -> Self {
        Self {
            limit: None,
            used: 0,
        }
    }

    /// Treats `0` as unbounded.
    pub fn with_limit_or_infinite(limit: u64) -> Self {
        if limit == 0 {
            Self::infinite()
        } else {
            Self::new(limit)
        }
    }

    /// Consume gas, returning error if insufficient.
    ///
    /// An exhausted meter reports the full limit as used.
    pub fn consume(&mut self, amount: u64) -> Result<(), TxError> {
        let wanted = self.used.saturating_add(amount);
        match self.limit {
            Some(limit) if wanted > limit => {
                self.used = limit;
                Err(TxError::OutOfGas { limit, wanted })
            }
            _ => {
                self.used = wanted;
                Ok(())
            }
        }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// `u64::MAX` for an unbounded meter.
    pub fn remaining(&self) -> u64 {
        match self.limit {
            Some(limit) => limit - self.used,
            None => u64::MAX,
        }
    }

    /// `0` for an unbounded meter.
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(0)
    }

    pub fn is_infinite(&self) -> bool {
        self.limit.is_none()
    }
}
