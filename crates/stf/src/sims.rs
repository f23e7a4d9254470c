//! Block delivery with generated transactions.

use crate::cancel::CancelToken;
use crate::context::{ExecEnv, ExecMode, ExecutionContext};
use crate::error::{Result, StfError, TxError};
use crate::gas::GasMeter;
use crate::result::{BlockResponse, TxResult};
use crate::stf::{SimsFailurePolicy, Stf, TxStage};
use ledgerflow_core::{txs_digest, BlockRequest, Transaction};
use ledgerflow_storage::{ReaderMap, WriterMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};

impl<T: Transaction> Stf<T> {
    /// Deliver a block whose transactions come from `generator` instead of
    /// `block.txs` (which are ignored).
    ///
    /// The generator runs in [`ExecMode::SimTxGen`] as the consensus identity
    /// on a branch that is dropped after each call, so it can read state but
    /// never change it. Each generated transaction then goes through the same
    /// pipeline as a block transaction. Generation stops when the generator
    /// returns `Ok(None)`; cancellation is checked before every iteration and
    /// aborts the run.
    #[instrument(skip_all, fields(height = block.header.height))]
    pub fn deliver_sims<F>(
        &self,
        block: &BlockRequest<T>,
        reader: Arc<dyn ReaderMap>,
        cancel: &CancelToken,
        mut generator: F,
    ) -> Result<(BlockResponse, WriterMap)>
    where
        F: FnMut(&mut ExecutionContext<'_>) -> std::result::Result<Option<T>, TxError>,
    {
        let mut writer = WriterMap::new(reader);
        let env = self.env(&block.header, cancel);
        let begin_block_events = self.begin_block_events(&mut writer, env)?;

        let mut tx_results = Vec::new();
        let mut tx_hashes = Vec::new();
        loop {
            if cancel.is_cancelled() {
                warn!(delivered = tx_results.len(), "Sims cancelled");
                return Err(StfError::Cancelled);
            }
            let tx = match self.generate(&mut writer, env, &mut generator)? {
                Some(tx) => tx,
                None => break,
            };
            tx_hashes.push(tx.hash());

            let outcome = self.execute_tx(
                &mut writer,
                env,
                ExecMode::Finalize,
                &tx,
                tx.gas_limit(),
                TxStage::Full,
            );
            match outcome {
                Ok(result) => tx_results.push(result),
                Err(StfError::Store(err))
                    if self.config().sims_failure_policy == SimsFailurePolicy::Skip =>
                {
                    let err = TxError::Store(err);
                    warn!(tx = %tx.hash(), error = %err, "Skipping failed sim transaction");
                    tx_results.push(TxResult::failure(tx.gas_limit(), 0, &err));
                }
                Err(err) => return Err(err),
            }
        }

        let end_block_events = self.end_block_events(&mut writer, env)?;
        let response = BlockResponse {
            height: block.header.height,
            txs_hash: txs_digest(&tx_hashes),
            begin_block_events,
            tx_results,
            end_block_events,
        };
        info!(
            txs = response.tx_results.len(),
            txs_hash = %response.txs_hash,
            failed = response.failed_count(),
            "Delivered sims block"
        );
        Ok((response, writer))
    }

    fn generate<F>(
        &self,
        writer: &mut WriterMap,
        env: ExecEnv<'_>,
        generator: &mut F,
    ) -> Result<Option<T>>
    where
        F: FnMut(&mut ExecutionContext<'_>) -> std::result::Result<Option<T>, TxError>,
    {
        writer.branch();
        let generated = {
            let mut ctx = ExecutionContext::new(
                writer,
                env,
                ExecMode::SimTxGen,
                env.consensus_identity,
                GasMeter::infinite(),
            );
            generator(&mut ctx)
        };
        writer.discard_branch()?;
        Ok(generated?)
    }
}
