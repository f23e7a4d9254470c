//! The transaction capability set and the signed transaction the bundled
//! modules use.

use crate::crypto::{Address, CryptoError, Keypair, PublicKey, Signature};
use crate::hash::{hash, Hash};
use crate::message::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding or inspecting a transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("malformed transaction bytes: {0}")]
    Decode(String),
    #[error("transaction carries no messages")]
    NoMessages,
    #[error("transaction carries no signers")]
    NoSigners,
    #[error("signature verification failed")]
    VerificationFailed,
}

impl From<CryptoError> for TransactionError {
    fn from(_: CryptoError) -> Self {
        TransactionError::VerificationFailed
    }
}

/// What the engine needs from a transaction. Implementations are immutable
/// once decoded; the engine only reads them.
pub trait Transaction: Clone + Send + Sync + 'static {
    /// Content hash identifying the transaction.
    fn hash(&self) -> Hash;

    /// Identities that authorised the transaction. The first signer is the
    /// caller seen by message handlers.
    fn signers(&self) -> Result<Vec<Address>, TransactionError>;

    fn messages(&self) -> Result<&[Message], TransactionError>;

    /// Declared gas limit.
    fn gas_limit(&self) -> u64;

    /// Canonical byte encoding, the inverse of the matching [`TxCodec`].
    fn encode(&self) -> Vec<u8>;
}

/// Decodes raw transaction bytes.
pub trait TxCodec<T>: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<T, TransactionError>;
}

/// The signed part of a [`SignedTx`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    /// Key of the single signer; the sender address derives from it.
    pub signer: PublicKey,
    /// Sender's sequence number.
    pub nonce: u64,
    pub messages: Vec<Message>,
    pub gas_limit: u64,
    pub memo: String,
}

/// A single-signer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub body: TxBody,
    pub signature: Signature,
}

impl SignedTx {
    /// Create an unsigned transaction.
    pub fn new(signer: PublicKey, nonce: u64, messages: Vec<Message>, gas_limit: u64) -> Self {
        Self {
            body: TxBody {
                signer,
                nonce,
                messages,
                gas_limit,
                memo: String::new(),
            },
            signature: Signature::default(),
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.body.memo = memo.into();
        self
    }

    /// Hash of the body, which is what gets signed.
    pub fn signing_hash(&self) -> Hash {
        let encoded = bincode::serialize(&self.body).expect("serialization should not fail");
        hash(&encoded)
    }

    pub fn sign(&mut self, keypair: &Keypair) {
        let digest = self.signing_hash();
        self.signature = keypair.sign(digest.as_bytes());
    }

    pub fn signed(mut self, keypair: &Keypair) -> Self {
        self.sign(keypair);
        self
    }

    pub fn verify(&self) -> Result<(), TransactionError> {
        let digest = self.signing_hash();
        self.body.signer.verify(digest.as_bytes(), &self.signature)?;
        Ok(())
    }

    pub fn sender(&self) -> Address {
        self.body.signer.to_address()
    }

    pub fn nonce(&self) -> u64 {
        self.body.nonce
    }
}

impl Transaction for SignedTx {
    fn hash(&self) -> Hash {
        hash(&self.encode())
    }

    fn signers(&self) -> Result<Vec<Address>, TransactionError> {
        Ok(vec![self.sender()])
    }

    fn messages(&self) -> Result<&[Message], TransactionError> {
        if self.body.messages.is_empty() {
            return Err(TransactionError::NoMessages);
        }
        Ok(&self.body.messages)
    }

    fn gas_limit(&self) -> u64 {
        self.body.gas_limit
    }

    fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialization should not fail")
    }
}

/// Bincode codec for [`SignedTx`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl TxCodec<SignedTx> for BincodeCodec {
    fn decode(&self, bytes: &[u8]) -> Result<SignedTx, TransactionError> {
        bincode::deserialize(bytes).map_err(|e| TransactionError::Decode(e.to_string()))
    }
}
