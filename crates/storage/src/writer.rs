//! Copy-on-write overlays over a [`ReaderMap`].
//!
//! A [`WriterMap`] buffers writes against a base reader without touching
//! it. Nested branches are kept as a stack of [`ChangeSet`] layers rather
//! than as a chain of overlay objects: opening a branch pushes a layer,
//! committing it folds the layer into the one below, discarding it pops it.
//! Reads walk the stack from the top and fall through to the base.

use crate::error::{Result, StoreError};
use crate::reader::ReaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pending write for one key: `Some` sets a value, `None` deletes it.
pub type PendingOp = Option<Vec<u8>>;

/// A set of pending writes, grouped by partition and sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    partitions: BTreeMap<String, BTreeMap<Vec<u8>, PendingOp>>,
}

impl ChangeSet {
    pub fn set(&mut self, partition: &str, key: Vec<u8>, value: Vec<u8>) {
        self.record(partition, key, Some(value));
    }

    pub fn delete(&mut self, partition: &str, key: Vec<u8>) {
        self.record(partition, key, None);
    }

    fn record(&mut self, partition: &str, key: Vec<u8>, op: PendingOp) {
        match self.partitions.get_mut(partition) {
            Some(ops) => {
                ops.insert(key, op);
            }
            None => {
                self.partitions
                    .insert(partition.to_string(), BTreeMap::from([(key, op)]));
            }
        }
    }

    /// Pending op for a key, if this set touches it.
    pub fn get(&self, partition: &str, key: &[u8]) -> Option<&PendingOp> {
        self.partitions.get(partition).and_then(|ops| ops.get(key))
    }

    /// Fold `newer` into `self`; for keys written by both, `newer` wins.
    pub fn merge(&mut self, newer: ChangeSet) {
        for (partition, ops) in newer.partitions {
            match self.partitions.get_mut(&partition) {
                Some(existing) => existing.extend(ops),
                None => {
                    self.partitions.insert(partition, ops);
                }
            }
        }
    }

    pub fn partitions(&self) -> impl Iterator<Item = (&String, &BTreeMap<Vec<u8>, PendingOp>)> {
        self.partitions.iter()
    }

    /// Flat view of every pending op in partition/key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8], Option<&[u8]>)> {
        self.partitions.iter().flat_map(|(partition, ops)| {
            ops.iter()
                .map(move |(key, op)| (partition.as_str(), key.as_slice(), op.as_deref()))
        })
    }

    /// Number of pending ops.
    pub fn len(&self) -> usize {
        self.partitions.values().map(|ops| ops.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A branchable overlay of pending writes on top of a base reader.
pub struct WriterMap {
    base: Arc<dyn ReaderMap>,
    /// `layers[0]` is the root overlay; every further entry is an open branch.
    layers: Vec<ChangeSet>,
}

impl WriterMap {
    /// Branch over `base`. Nothing is copied.
    pub fn new(base: Arc<dyn ReaderMap>) -> Self {
        Self {
            base,
            layers: vec![ChangeSet::default()],
        }
    }

    /// Version of the reader this overlay sits on.
    pub fn base_version(&self) -> u64 {
        self.base.version()
    }

    pub fn base(&self) -> &Arc<dyn ReaderMap> {
        &self.base
    }

    /// Read through pending writes, newest branch first, then the base.
    pub fn get(&self, partition: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        for layer in self.layers.iter().rev() {
            if let Some(op) = layer.get(partition, key) {
                return Ok(op.clone());
            }
        }
        self.base.get(partition, key)
    }

    pub fn has(&self, partition: &str, key: &[u8]) -> Result<bool> {
        for layer in self.layers.iter().rev() {
            if let Some(op) = layer.get(partition, key) {
                return Ok(op.is_some());
            }
        }
        self.base.has(partition, key)
    }

    /// Buffer a write in the innermost open branch.
    pub fn set(&mut self, partition: &str, key: Vec<u8>, value: Vec<u8>) {
        self.top_mut().set(partition, key, value);
    }

    /// Buffer a delete in the innermost open branch.
    pub fn delete(&mut self, partition: &str, key: Vec<u8>) {
        self.top_mut().delete(partition, key);
    }

    fn top_mut(&mut self) -> &mut ChangeSet {
        if self.layers.is_empty() {
            self.layers.push(ChangeSet::default());
        }
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// Open a nested branch. Returns the new branch depth.
    pub fn branch(&mut self) -> usize {
        self.layers.push(ChangeSet::default());
        self.depth()
    }

    /// Number of open nested branches.
    pub fn depth(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    /// Fold the innermost branch into its parent.
    pub fn commit_branch(&mut self) -> Result<()> {
        let child = self.pop_branch()?;
        self.top_mut().merge(child);
        Ok(())
    }

    /// Drop the innermost branch and everything written in it.
    pub fn discard_branch(&mut self) -> Result<()> {
        self.pop_branch().map(|_| ())
    }

    fn pop_branch(&mut self) -> Result<ChangeSet> {
        if self.depth() == 0 {
            return Err(StoreError::NoOpenBranch);
        }
        self.layers.pop().ok_or(StoreError::NoOpenBranch)
    }

    /// Fold a detached change set into the innermost branch, last writer
    /// wins per key.
    pub fn merge(&mut self, child: ChangeSet) {
        self.top_mut().merge(child);
    }

    /// Pending writes of all layers flattened into one set.
    pub fn changes(&self) -> ChangeSet {
        let mut flat = ChangeSet::default();
        for layer in &self.layers {
            flat.merge(layer.clone());
        }
        flat
    }

    /// Consume the overlay, yielding its flattened writes.
    /// Fails while nested branches are still open.
    pub fn into_changes(self) -> Result<ChangeSet> {
        if self.depth() > 0 {
            return Err(StoreError::OpenBranches(self.depth()));
        }
        let mut layers = self.layers;
        Ok(layers.pop().unwrap_or_default())
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(ChangeSet::is_empty)
    }
}

impl fmt::Debug for WriterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterMap")
            .field("base_version", &self.base.version())
            .field("depth", &self.depth())
            .field("pending", &self.layers.iter().map(ChangeSet::len).sum::<usize>())
            .finish()
    }
}
