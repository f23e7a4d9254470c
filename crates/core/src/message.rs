//! Type-tagged application messages.
//!
//! The engine routes messages by their `type_url` and never looks inside
//! `value`; modules pack and unpack their own typed structs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while packing or unpacking a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("expected message type {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("malformed {type_url} payload: {reason}")]
    Malformed { type_url: String, reason: String },
}

/// A message type with a stable routing name.
pub trait TypedMessage: Serialize + DeserializeOwned {
    const TYPE_URL: &'static str;
}

/// An opaque, routable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub type_url: String,
    pub value: Vec<u8>,
}

impl Message {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// Encode a typed message.
    pub fn pack<M: TypedMessage>(msg: &M) -> Self {
        let value = bincode::serialize(msg).expect("serialization should not fail");
        Self::new(M::TYPE_URL, value)
    }

    /// Decode into a typed message, checking the type tag first.
    pub fn unpack<M: TypedMessage>(&self) -> Result<M, MessageError> {
        if !self.is::<M>() {
            return Err(MessageError::TypeMismatch {
                expected: M::TYPE_URL.to_string(),
                got: self.type_url.clone(),
            });
        }
        bincode::deserialize(&self.value).map_err(|e| MessageError::Malformed {
            type_url: self.type_url.clone(),
            reason: e.to_string(),
        })
    }

    pub fn is<M: TypedMessage>(&self) -> bool {
        self.type_url == M::TYPE_URL
    }
}
