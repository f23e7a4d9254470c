//! Façade configuration and state version selection.

use serde::{Deserialize, Serialize};

/// Gas caps applied by the façade on top of what callers ask for.
///
/// A cap of `0` leaves the requested limit untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppManagerConfig {
    pub validate_tx_gas_limit: u64,
    pub query_gas_limit: u64,
    pub simulation_gas_limit: u64,
}

impl Default for AppManagerConfig {
    fn default() -> Self {
        Self {
            validate_tx_gas_limit: 100_000_000,
            query_gas_limit: 100_000_000,
            simulation_gas_limit: 100_000_000,
        }
    }
}

/// Combine a requested gas limit with a configured cap, where `0` on either
/// side means unbounded.
pub fn capped_gas(requested: u64, cap: u64) -> u64 {
    match (requested, cap) {
        (r, 0) => r,
        (0, c) => c,
        (r, c) => r.min(c),
    }
}

/// Which committed version a read-side call executes against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateVersion {
    #[default]
    Latest,
    At(u64),
}

impl From<Option<u64>> for StateVersion {
    fn from(version: Option<u64>) -> Self {
        version.map_or(StateVersion::Latest, StateVersion::At)
    }
}
