//! Message and query routing by type URL.

use crate::context::ExecutionContext;
use crate::error::{StfError, TxError};
use ledgerflow_core::{Message, TypedMessage};
use std::collections::BTreeMap;

/// Type-erased handler.
pub type Handler =
    Box<dyn Fn(&mut ExecutionContext<'_>, &Message) -> Result<Message, TxError> + Send + Sync>;

/// Dispatch table from type URL to handler. Used for both transaction
/// messages and queries.
#[derive(Default)]
pub struct MsgRouter {
    handlers: BTreeMap<String, Handler>,
}

impl MsgRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `M`, answering with `R`.
    pub fn register<M, R, F>(&mut self, handler: F) -> Result<(), StfError>
    where
        M: TypedMessage + 'static,
        R: TypedMessage + 'static,
        F: Fn(&mut ExecutionContext<'_>, M) -> Result<R, TxError> + Send + Sync + 'static,
    {
        self.register_raw(
            M::TYPE_URL,
            Box::new(move |ctx, msg| {
                let request: M = msg.unpack()?;
                let response = handler(ctx, request)?;
                Ok(Message::pack(&response))
            }),
        )
    }

    pub fn register_raw(&mut self, type_url: &str, handler: Handler) -> Result<(), StfError> {
        if self.handlers.contains_key(type_url) {
            return Err(StfError::DuplicateHandler(type_url.to_string()));
        }
        self.handlers.insert(type_url.to_string(), handler);
        Ok(())
    }

    pub fn contains(&self, type_url: &str) -> bool {
        self.handlers.contains_key(type_url)
    }

    pub fn type_urls(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(&self, ctx: &mut ExecutionContext<'_>, msg: &Message) -> Result<Message, TxError> {
        match self.handlers.get(&msg.type_url) {
            Some(handler) => handler(ctx, msg),
            None => Err(TxError::UnknownMessage(msg.type_url.clone())),
        }
    }
}

impl std::fmt::Debug for MsgRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}
