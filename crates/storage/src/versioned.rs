//! The versioned store: one immutable snapshot per committed height.

use crate::db::{BatchOp, Storage};
use crate::error::{Result, StoreError};
use crate::reader::{Partition, ReaderMap, Snapshot};
use crate::writer::{ChangeSet, WriterMap};
use ledgerflow_core::Hash;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Number of most recent versions kept readable. `0` keeps every version.
    pub keep_recent: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { keep_recent: 100 }
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub version: u64,
    pub root: Hash,
}

/// Multi-version state store.
///
/// Readers are handed out as `Arc<Snapshot>` and stay valid for as long as
/// the caller holds them, even after their version is pruned. Commits are
/// serialized by a single lock; reads never wait on it.
pub struct VersionedStore {
    config: StoreConfig,
    snapshots: RwLock<BTreeMap<u64, Arc<Snapshot>>>,
    commit_lock: Mutex<()>,
    db: Option<Storage>,
}

impl VersionedStore {
    /// Purely in-memory store starting from the empty state at version 0.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::with_snapshot(config, Snapshot::empty(), None)
    }

    /// Open (or create) a sled-backed store and load its latest version.
    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        Self::load(Storage::open(path)?, config)
    }

    /// sled-backed store in a temporary database (for testing).
    pub fn open_temporary(config: StoreConfig) -> Result<Self> {
        Self::load(Storage::open_temporary()?, config)
    }

    fn load(db: Storage, config: StoreConfig) -> Result<Self> {
        let version = db.latest_version()?.unwrap_or(0);

        let mut partitions: BTreeMap<String, Partition> = BTreeMap::new();
        for (partition, key, value) in db.scan_state()? {
            partitions.entry(partition).or_default().insert(key, value);
        }
        let snapshot = Snapshot::from_partitions(version, partitions);

        if let Some(root) = db.latest_root()? {
            let computed = snapshot.root_hash();
            if computed != Hash(root) {
                return Err(StoreError::Corrupted(format!(
                    "root mismatch at version {}: stored {}, computed {}",
                    version,
                    Hash(root),
                    computed
                )));
            }
        }

        info!(version, entries = snapshot.len(), "Loaded store");
        Ok(Self::with_snapshot(config, snapshot, Some(db)))
    }

    fn with_snapshot(config: StoreConfig, snapshot: Snapshot, db: Option<Storage>) -> Self {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(snapshot.version(), Arc::new(snapshot));
        Self {
            config,
            snapshots: RwLock::new(snapshots),
            commit_lock: Mutex::new(()),
            db,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn latest_version(&self) -> u64 {
        self.snapshots
            .read()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    /// Oldest version still readable.
    pub fn oldest_version(&self) -> u64 {
        self.snapshots.read().keys().next().copied().unwrap_or(0)
    }

    /// Snapshot at the latest committed version.
    pub fn latest(&self) -> Arc<Snapshot> {
        let snapshots = self.snapshots.read();
        match snapshots.values().next_back() {
            Some(snapshot) => snapshot.clone(),
            None => Arc::new(Snapshot::empty()),
        }
    }

    /// Snapshot at `version`; fails if it was never committed or has been
    /// pruned.
    pub fn open_reader(&self, version: u64) -> Result<Arc<Snapshot>> {
        self.snapshots
            .read()
            .get(&version)
            .cloned()
            .ok_or(StoreError::VersionNotFound(version))
    }

    /// A fresh writer over the latest snapshot.
    pub fn new_writer(&self) -> WriterMap {
        WriterMap::new(self.latest())
    }

    pub fn latest_root(&self) -> Hash {
        self.latest().root_hash()
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Materialize `writer` as the next version.
    ///
    /// The writer must be based on the latest version and have no open
    /// branches. On error nothing is written.
    #[instrument(skip(self, writer), fields(base = writer.base_version()))]
    pub fn commit(&self, writer: WriterMap) -> Result<CommitInfo> {
        let base = writer.base_version();
        let changes = writer.into_changes()?;
        self.commit_on(base, &changes)
    }

    /// Apply a change set on top of the latest version.
    pub fn commit_changes(&self, changes: &ChangeSet) -> Result<CommitInfo> {
        let _guard = self.commit_lock.lock();
        let base = self.latest_version();
        self.apply_locked(base, changes)
    }

    fn commit_on(&self, base: u64, changes: &ChangeSet) -> Result<CommitInfo> {
        let _guard = self.commit_lock.lock();
        let latest = self.latest_version();
        if base != latest {
            return Err(StoreError::StaleBase { base, latest });
        }
        self.apply_locked(base, changes)
    }

    fn apply_locked(&self, base: u64, changes: &ChangeSet) -> Result<CommitInfo> {
        let parent = self.open_reader(base)?;
        let version = base + 1;
        let next = parent.apply(version, changes);
        let root = next.root_hash();

        if let Some(db) = &self.db {
            let mut ops = changes
                .iter()
                .map(|(partition, key, value)| {
                    let key = Storage::state_key(partition, key)?;
                    Ok(match value {
                        Some(value) => BatchOp::Insert {
                            key,
                            value: value.to_vec(),
                        },
                        None => BatchOp::Remove { key },
                    })
                })
                .collect::<Result<Vec<BatchOp>>>()?;
            ops.extend(Storage::meta_ops(version, root.as_bytes())?);
            db.batch(ops)?;
            db.flush()?;
        }

        let mut snapshots = self.snapshots.write();
        snapshots.insert(version, Arc::new(next));
        let pruned = self.prune(&mut snapshots, version);
        drop(snapshots);

        info!(version, changes = changes.len(), %root, "Committed state");
        if pruned > 0 {
            debug!(pruned, "Pruned old versions");
        }
        Ok(CommitInfo { version, root })
    }

    fn prune(&self, snapshots: &mut BTreeMap<u64, Arc<Snapshot>>, latest: u64) -> usize {
        if self.config.keep_recent == 0 || latest < self.config.keep_recent {
            return 0;
        }
        let keep_from = latest + 1 - self.config.keep_recent;
        let retained = snapshots.split_off(&keep_from);
        let pruned = snapshots.len();
        *snapshots = retained;
        pruned
    }
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("latest", &self.latest_version())
            .field("oldest", &self.oldest_version())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(store: &VersionedStore, key: &str, value: &str) -> CommitInfo {
        let mut writer = store.new_writer();
        writer.set("bank", key.as_bytes().to_vec(), value.as_bytes().to_vec());
        store.commit(writer).unwrap()
    }

    #[test]
    fn test_commit_produces_next_version() {
        let store = VersionedStore::in_memory(StoreConfig::default());
        assert_eq!(store.latest_version(), 0);

        let info = write(&store, "alice", "10");
        assert_eq!(info.version, 1);
        assert_eq!(info.root, store.latest_root());
        assert_eq!(store.latest_version(), 1);
        assert_eq!(
            store.latest().get("bank", b"alice").unwrap(),
            Some(b"10".to_vec())
        );
    }

    #[test]
    fn test_old_reader_stays_valid() {
        let store = VersionedStore::in_memory(StoreConfig::default());
        write(&store, "alice", "10");
        let v1 = store.open_reader(1).unwrap();
        write(&store, "alice", "3");

        assert_eq!(v1.get("bank", b"alice").unwrap(), Some(b"10".to_vec()));
        assert_eq!(
            store.open_reader(2).unwrap().get("bank", b"alice").unwrap(),
            Some(b"3".to_vec())
        );
    }

    #[test]
    fn test_stale_writer_rejected() {
        let store = VersionedStore::in_memory(StoreConfig::default());
        let stale = store.new_writer();
        write(&store, "alice", "10");

        let err = store.commit(stale).unwrap_err();
        assert!(matches!(err, StoreError::StaleBase { base: 0, latest: 1 }));
        assert_eq!(store.latest_version(), 1);
    }

    #[test]
    fn test_open_branches_rejected() {
        let store = VersionedStore::in_memory(StoreConfig::default());
        let mut writer = store.new_writer();
        writer.branch();
        writer.set("bank", b"k".to_vec(), b"v".to_vec());

        assert!(matches!(
            store.commit(writer),
            Err(StoreError::OpenBranches(1))
        ));
        assert_eq!(store.latest_version(), 0);
    }

    #[test]
    fn test_pruning() {
        let store = VersionedStore::in_memory(StoreConfig { keep_recent: 2 });
        for i in 0..4 {
            write(&store, "k", &i.to_string());
        }
        assert_eq!(store.latest_version(), 4);
        assert_eq!(store.oldest_version(), 3);
        assert!(matches!(
            store.open_reader(2),
            Err(StoreError::VersionNotFound(2))
        ));
        assert!(store.open_reader(3).is_ok());
        assert!(matches!(
            store.open_reader(9),
            Err(StoreError::VersionNotFound(9))
        ));
    }

    #[test]
    fn test_keep_all_versions() {
        let store = VersionedStore::in_memory(StoreConfig { keep_recent: 0 });
        for i in 0..5 {
            write(&store, "k", &i.to_string());
        }
        assert_eq!(store.oldest_version(), 0);
        assert!(store.open_reader(0).is_ok());
    }

    #[test]
    fn test_commit_changes_on_latest() {
        let store = VersionedStore::in_memory(StoreConfig::default());
        let mut changes = ChangeSet::default();
        changes.set("auth", b"n".to_vec(), b"1".to_vec());
        let info = store.commit_changes(&changes).unwrap();
        assert_eq!(info.version, 1);
        assert!(store.latest().has("auth", b"n").unwrap());
    }

    #[test]
    fn test_persistent_reopen() {
        let dir = TempDir::new().unwrap();
        let root;
        {
            let store = VersionedStore::open(dir.path(), StoreConfig::default()).unwrap();
            assert!(store.is_persistent());
            write(&store, "alice", "10");
            write(&store, "bob", "4");

            let mut writer = store.new_writer();
            writer.delete("bank", b"alice".to_vec());
            root = store.commit(writer).unwrap().root;
        }

        let store = VersionedStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.latest_version(), 3);
        assert_eq!(store.latest_root(), root);
        assert_eq!(store.latest().get("bank", b"alice").unwrap(), None);
        assert_eq!(
            store.latest().get("bank", b"bob").unwrap(),
            Some(b"4".to_vec())
        );
        // history is not reloaded
        assert!(store.open_reader(1).is_err());
    }

    #[test]
    fn test_temporary_store_commits() {
        let store = VersionedStore::open_temporary(StoreConfig::default()).unwrap();
        write(&store, "alice", "1");
        assert_eq!(store.latest_version(), 1);
    }

    #[test]
    fn test_unencodable_partition_fails_whole_commit() {
        let store = VersionedStore::open_temporary(StoreConfig::default()).unwrap();
        let mut writer = store.new_writer();
        writer.set("bank", b"alice".to_vec(), b"1".to_vec());
        writer.set(&"p".repeat(u16::MAX as usize + 1), b"k".to_vec(), b"v".to_vec());

        assert!(matches!(store.commit(writer), Err(StoreError::Corrupted(_))));
        assert_eq!(store.latest_version(), 0);
        assert_eq!(store.latest().get("bank", b"alice").unwrap(), None);

        write(&store, "alice", "1");
        assert_eq!(store.latest_version(), 1);
    }
}
