//! The App Manager: the engine bound to a versioned store.

use crate::config::{capped_gas, AppManagerConfig, StateVersion};
use ledgerflow_core::{BlockRequest, HeaderInfo, Hash, Message, Transaction, TransactionError, TxCodec};
use ledgerflow_stf::{BlockResponse, CancelToken, ExecutionContext, Stf, StfError, TxError, TxResult};
use ledgerflow_storage::{ChangeSet, CommitInfo, ReaderMap, StoreError, VersionedStore, WriterMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors returned by [`AppManager`] calls.
#[derive(Debug, Error)]
pub enum AppManagerError {
    #[error("engine error: {0}")]
    Stf(#[from] StfError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("block height {got} does not follow latest version (expected {expected})")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("genesis already applied, latest version is {0}")]
    AlreadyInitialized(u64),
}

pub type Result<T> = std::result::Result<T, AppManagerError>;

/// Façade that resolves store snapshots for the engine and owns commits.
///
/// Block delivery returns the uncommitted [`WriterMap`]; the owning process
/// decides when to pass it to [`AppManager::commit`]. Read-side calls may run
/// concurrently from any number of threads.
pub struct AppManager<T: Transaction> {
    config: AppManagerConfig,
    store: Arc<VersionedStore>,
    stf: Stf<T>,
    codec: Box<dyn TxCodec<T>>,
}

impl<T: Transaction> AppManager<T> {
    pub fn new(
        config: AppManagerConfig,
        store: Arc<VersionedStore>,
        stf: Stf<T>,
        codec: impl TxCodec<T> + 'static,
    ) -> Self {
        Self {
            config,
            store,
            stf,
            codec: Box::new(codec),
        }
    }

    pub fn config(&self) -> &AppManagerConfig {
        &self.config
    }

    pub fn stf(&self) -> &Stf<T> {
        &self.stf
    }

    pub fn latest_version(&self) -> u64 {
        self.store.latest_version()
    }

    pub fn oldest_version(&self) -> u64 {
        self.store.oldest_version()
    }

    pub fn latest_root(&self) -> Hash {
        self.store.latest_root()
    }

    /// Decode raw transaction bytes with the configured codec.
    pub fn decode_tx(&self, bytes: &[u8]) -> std::result::Result<T, TransactionError> {
        self.codec.decode(bytes)
    }

    fn reader(&self, version: StateVersion) -> Result<Arc<dyn ReaderMap>> {
        let snapshot: Arc<dyn ReaderMap> = match version {
            StateVersion::Latest => self.store.latest(),
            StateVersion::At(v) => self.store.open_reader(v)?,
        };
        Ok(snapshot)
    }

    /// Latest snapshot, checked to be the parent of a block at `height`.
    fn parent_of(&self, height: u64) -> Result<Arc<dyn ReaderMap>> {
        let snapshot: Arc<dyn ReaderMap> = self.store.latest();
        check_next_height(snapshot.version(), height)?;
        Ok(snapshot)
    }

    /// Gas limit for a transaction: the requested limit (or the declared one
    /// when `0`), bounded by `cap` if set. A declared limit of `0` stays `0`.
    fn tx_gas_limit(requested: u64, tx: &T, cap: u64) -> u64 {
        match if requested == 0 { tx.gas_limit() } else { requested } {
            0 => 0,
            wanted => capped_gas(wanted, cap),
        }
    }

    // =========================================================================
    // Block delivery
    // =========================================================================

    /// Execute the next block against the latest committed state.
    #[instrument(skip_all, fields(height = block.height(), txs = block.txs.len()))]
    pub fn deliver_block(
        &self,
        block: &BlockRequest<T>,
        cancel: &CancelToken,
    ) -> Result<(BlockResponse, WriterMap)> {
        let parent = self.parent_of(block.height())?;
        Ok(self.stf.deliver_block(block, parent, cancel)?)
    }

    /// Like [`deliver_block`](Self::deliver_block) for raw transactions.
    ///
    /// Entries that fail to decode get a failed result at their position and
    /// never reach the engine.
    pub fn deliver_block_bytes(
        &self,
        header: HeaderInfo,
        raw_txs: &[Vec<u8>],
        cancel: &CancelToken,
    ) -> Result<(BlockResponse, WriterMap)> {
        let mut txs = Vec::with_capacity(raw_txs.len());
        let mut slots = Vec::with_capacity(raw_txs.len());
        for (index, bytes) in raw_txs.iter().enumerate() {
            match self.codec.decode(bytes) {
                Ok(tx) => {
                    txs.push(tx);
                    slots.push(None);
                }
                Err(err) => {
                    debug!(index, error = %err, "Undecodable transaction in block");
                    slots.push(Some(decode_failure(err)));
                }
            }
        }

        let (mut response, writer) = self.deliver_block(&BlockRequest::new(header, txs), cancel)?;
        let mut executed = std::mem::take(&mut response.tx_results).into_iter();
        response.tx_results = slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| executed.next()))
            .collect();
        Ok((response, writer))
    }

    /// Sims delivery: transactions come from `generator` instead of the
    /// block.
    pub fn deliver_sims<F>(
        &self,
        block: &BlockRequest<T>,
        cancel: &CancelToken,
        generator: F,
    ) -> Result<(BlockResponse, WriterMap)>
    where
        F: FnMut(&mut ExecutionContext<'_>) -> std::result::Result<Option<T>, TxError>,
    {
        let parent = self.parent_of(block.height())?;
        Ok(self.stf.deliver_sims(block, parent, cancel, generator)?)
    }

    /// Build the first block's state: `initializer` runs as the consensus
    /// identity, then `genesis_txs` are delivered on top of its writes.
    ///
    /// Only valid on an empty store, with a header at height 1.
    pub fn init_genesis<F>(
        &self,
        header: HeaderInfo,
        genesis_txs: Vec<T>,
        cancel: &CancelToken,
        initializer: F,
    ) -> Result<(BlockResponse, WriterMap)>
    where
        F: FnOnce(&mut ExecutionContext<'_>) -> std::result::Result<(), TxError>,
    {
        let snapshot: Arc<dyn ReaderMap> = self.store.latest();
        if snapshot.version() != 0 {
            return Err(AppManagerError::AlreadyInitialized(snapshot.version()));
        }
        check_next_height(snapshot.version(), header.height)?;

        let block = BlockRequest::new(header, genesis_txs);
        let ((), writer) =
            self.stf
                .run_with_ctx_on(WriterMap::new(snapshot), &block.header, cancel, initializer)?;
        let (response, writer) = self.stf.deliver_block_with(&block, writer, cancel)?;
        info!(
            chain_id = %block.header.chain_id,
            txs = block.txs.len(),
            "Genesis prepared"
        );
        Ok((response, writer))
    }

    /// Commit a delivered block's state as the next version.
    pub fn commit(&self, writer: WriterMap) -> Result<CommitInfo> {
        Ok(self.store.commit(writer)?)
    }

    // =========================================================================
    // Read-side calls
    // =========================================================================

    /// Check a transaction for admission without executing its messages.
    pub fn validate_tx(
        &self,
        version: StateVersion,
        gas_limit: u64,
        tx: &T,
        cancel: &CancelToken,
    ) -> Result<TxResult> {
        let limit = Self::tx_gas_limit(gas_limit, tx, self.config.validate_tx_gas_limit);
        Ok(self.stf.validate_tx(self.reader(version)?, limit, tx, cancel)?)
    }

    pub fn validate_tx_bytes(
        &self,
        version: StateVersion,
        gas_limit: u64,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<TxResult> {
        match self.codec.decode(bytes) {
            Ok(tx) => self.validate_tx(version, gas_limit, &tx, cancel),
            Err(err) => Ok(decode_failure(err)),
        }
    }

    /// Execute a transaction without committing and return the changes it
    /// would make.
    pub fn simulate(
        &self,
        version: StateVersion,
        gas_limit: u64,
        tx: &T,
        cancel: &CancelToken,
    ) -> Result<(TxResult, ChangeSet)> {
        let limit = Self::tx_gas_limit(gas_limit, tx, self.config.simulation_gas_limit);
        let (result, writer) = self.stf.simulate(self.reader(version)?, limit, tx, cancel)?;
        Ok((result, writer.changes()))
    }

    pub fn simulate_bytes(
        &self,
        version: StateVersion,
        gas_limit: u64,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<(TxResult, ChangeSet)> {
        match self.codec.decode(bytes) {
            Ok(tx) => self.simulate(version, gas_limit, &tx, cancel),
            Err(err) => Ok((decode_failure(err), ChangeSet::default())),
        }
    }

    pub fn query(
        &self,
        version: StateVersion,
        gas_limit: u64,
        request: &Message,
        cancel: &CancelToken,
    ) -> Result<Message> {
        let limit = capped_gas(gas_limit, self.config.query_gas_limit);
        Ok(self.stf.query(self.reader(version)?, limit, request, cancel)?)
    }
}

/// Failed result for bytes the codec rejected. No gas is charged.
/// A block at `height` must directly follow the `parent` version.
fn check_next_height(parent: u64, height: u64) -> Result<()> {
    let expected = parent + 1;
    if height != expected {
        return Err(AppManagerError::HeightMismatch {
            expected,
            got: height,
        });
    }
    Ok(())
}

fn decode_failure(err: TransactionError) -> TxResult {
    let err = match err {
        TransactionError::Decode(_) => err,
        other => TransactionError::Decode(other.to_string()),
    };
    TxResult::failure(0, 0, &TxError::InvalidTx(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_core::{Keypair, SignedTx};
    use ledgerflow_stf::DECODE_CODESPACE;

    fn tx_with_gas(gas_limit: u64) -> SignedTx {
        let keypair = Keypair::from_seed(1);
        SignedTx::new(keypair.public_key, 0, vec![Message::new("/t", vec![])], gas_limit)
    }

    #[test]
    fn test_tx_gas_limit() {
        let declared = tx_with_gas(5_000);
        assert_eq!(AppManager::tx_gas_limit(0, &declared, 0), 5_000);
        assert_eq!(AppManager::tx_gas_limit(0, &declared, 1_000), 1_000);
        assert_eq!(AppManager::tx_gas_limit(200, &declared, 1_000), 200);
        assert_eq!(AppManager::tx_gas_limit(9_000, &declared, 0), 9_000);

        // a tx that declares no gas is not topped up to the cap
        assert_eq!(AppManager::tx_gas_limit(0, &tx_with_gas(0), 1_000), 0);
    }

    #[test]
    fn test_check_next_height() {
        assert!(check_next_height(0, 1).is_ok());
        assert!(check_next_height(4, 5).is_ok());
        assert!(matches!(
            check_next_height(4, 4),
            Err(AppManagerError::HeightMismatch { expected: 5, got: 4 })
        ));
    }

    #[test]
    fn test_decode_failure_code() {
        let result = decode_failure(TransactionError::Decode("eof".into()));
        assert_eq!(result.code(), Some((DECODE_CODESPACE, 1)));
        assert_eq!(result.gas_used, 0);

        let result = decode_failure(TransactionError::NoSigners);
        assert_eq!(result.code(), Some((DECODE_CODESPACE, 1)));
    }
}
