//! Core primitives for ledgerflow.
//!
//! This crate provides the types shared by the store, the engine and the
//! application modules:
//! - Hashing and ed25519 identities
//! - Type-tagged messages
//! - The transaction capability trait and a signed transaction
//! - Header info and block requests
//! - Events

pub mod block;
pub mod crypto;
pub mod event;
pub mod hash;
pub mod message;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{txs_digest, BlockRequest, HeaderInfo};
pub use crypto::{Address, CryptoError, Keypair, PublicKey, Signature};
pub use event::{Event, EventAttribute};
pub use hash::{hash, Digest, Hash};
pub use message::{Message, MessageError, TypedMessage};
pub use transaction::{BincodeCodec, SignedTx, Transaction, TransactionError, TxBody, TxCodec};
