//! Application modules executed by the ledgerflow engine.
//!
//! - [`auth`]: signature and nonce validation, account queries
//! - [`bank`]: balances, transfers, minting
//! - [`genesis`]: initial balances
//! - [`sims`]: random transfer workload for sims delivery
//!
//! # Example
//!
//! ```rust
//! use ledgerflow_modules::build_stf;
//! use ledgerflow_stf::StfConfig;
//!
//! let stf = build_stf(StfConfig::default()).unwrap();
//! assert!(stf.msg_router().contains("/ledgerflow.bank.v1.MsgSend"));
//! ```

pub mod auth;
pub mod bank;
pub mod genesis;
pub mod sims;

pub use auth::{AuthError, AuthHooks, AuthValidator};
pub use bank::{BankError, MsgMint, MsgSend, QueryBalance, QuerySupply};
pub use genesis::{GenesisAccount, GenesisError, GenesisState};
pub use sims::{sim_accounts, TransferGenerator};

use ledgerflow_core::SignedTx;
use ledgerflow_stf::{Stf, StfConfig, StfError};

/// Engine for [`SignedTx`] with every module wired in.
pub fn build_stf(config: StfConfig) -> Result<Stf<SignedTx>, StfError> {
    let mut builder = Stf::builder()
        .config(config)
        .validator(AuthValidator::default())
        .hooks(AuthHooks);
    auth::register(&mut builder)?;
    bank::register(&mut builder)?;
    Ok(builder.build())
}
