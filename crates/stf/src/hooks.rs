//! Extension points run around message execution.

use crate::context::ExecutionContext;
use crate::error::TxError;
use ledgerflow_core::Transaction;

/// Checks run on every transaction before its messages execute.
///
/// Validators run on the transaction's own branch, so writes they make
/// (nonce bumps, fee deductions) are kept only if the whole transaction
/// succeeds.
pub trait TxValidator<T: Transaction>: Send + Sync {
    fn validate(&self, ctx: &mut ExecutionContext<'_>, tx: &T) -> Result<(), TxError>;
}

/// Logic run once per block, before and after the transactions.
///
/// Hooks run in finalize mode under the consensus identity with an
/// unbounded gas meter. Any error aborts the block.
pub trait BlockHooks: Send + Sync {
    fn begin_block(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), TxError> {
        Ok(())
    }

    fn end_block(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), TxError> {
        Ok(())
    }
}
