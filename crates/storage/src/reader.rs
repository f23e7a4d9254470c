//! Immutable, versioned views of state.

use crate::error::Result;
use crate::writer::ChangeSet;
use ledgerflow_core::{Digest, Hash};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read access to state at a fixed version, addressed by partition name
/// and key.
///
/// Implementations must be safe to share between threads: validation,
/// simulation and queries read the same snapshot concurrently.
pub trait ReaderMap: Send + Sync {
    /// Version this view was committed at.
    fn version(&self) -> u64;

    fn get(&self, partition: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn has(&self, partition: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(partition, key)?.is_some())
    }
}

/// Sorted key/value contents of one partition.
pub type Partition = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory committed state at one version.
///
/// Partitions are reference counted so that a commit only copies the
/// partitions it touches; every older snapshot stays valid and unchanged.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    partitions: BTreeMap<String, Arc<Partition>>,
}

impl Snapshot {
    /// The empty state at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_partitions(version: u64, partitions: BTreeMap<String, Partition>) -> Self {
        Self {
            version,
            partitions: partitions
                .into_iter()
                .filter(|(_, entries)| !entries.is_empty())
                .map(|(name, entries)| (name, Arc::new(entries)))
                .collect(),
        }
    }

    pub fn partition_names(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }

    /// Entries of one partition in key order.
    pub fn iter_partition<'a>(
        &'a self,
        partition: &str,
    ) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.partitions
            .get(partition)
            .into_iter()
            .flat_map(|entries| entries.iter())
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Total number of entries across partitions.
    pub fn len(&self) -> usize {
        self.partitions.values().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Deterministic digest of the full contents.
    ///
    /// Partitions and keys are visited in sorted order and every field is
    /// length-prefixed, so equal contents give equal roots on every node.
    pub fn root_hash(&self) -> Hash {
        let mut digest = Digest::new();
        for (name, entries) in &self.partitions {
            digest.field(name.as_bytes()).count(entries.len());
            for (key, value) in entries.iter() {
                digest.field(key).field(value);
            }
        }
        digest.finish()
    }

    /// Build the next version by applying `changes` on top of this one.
    /// `self` is left untouched.
    pub fn apply(&self, version: u64, changes: &ChangeSet) -> Snapshot {
        let mut partitions = self.partitions.clone();
        for (name, ops) in changes.partitions() {
            let slot = partitions.entry(name.to_string()).or_default();
            let entries = Arc::make_mut(slot);
            for (key, op) in ops {
                match op {
                    Some(value) => {
                        entries.insert(key.clone(), value.clone());
                    }
                    None => {
                        entries.remove(key);
                    }
                }
            }
            if entries.is_empty() {
                partitions.remove(name);
            }
        }
        Snapshot {
            version,
            partitions,
        }
    }
}

impl ReaderMap for Snapshot {
    fn version(&self) -> u64 {
        self.version
    }

    fn get(&self, partition: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .partitions
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }
}
