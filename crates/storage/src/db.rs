//! sled persistence for committed state.

use crate::error::{Result, StoreError};
use sled::Db;
use std::path::Path;

const STATE_PREFIX: &[u8] = b"s:";
const META_VERSION_KEY: &[u8] = b"meta:version";
const META_ROOT_KEY: &[u8] = b"meta:root";

/// Wrapper around sled database with serialization and key helpers.
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a serializable value.
    pub fn put<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    /// Retrieve and deserialize a value.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Apply multiple operations atomically.
    ///
    /// The batch is collected in memory and handed to sled's `apply_batch`,
    /// which writes it through the WAL in one step.
    pub fn batch(&self, operations: Vec<BatchOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in operations {
            match op {
                BatchOp::Insert { key, value } => batch.insert(key, value),
                BatchOp::Remove { key } => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Committed state layout
    // =========================================================================

    /// Key for one state entry.
    /// Format: "s:" + partition_len (u16 BE) + partition + key
    ///
    /// Partition names longer than `u16::MAX` bytes cannot be encoded.
    pub fn state_key(partition: &str, key: &[u8]) -> Result<Vec<u8>> {
        let len = u16::try_from(partition.len()).map_err(|_| {
            StoreError::Corrupted(format!("partition name of {} bytes is too long", partition.len()))
        })?;
        let mut out = Vec::with_capacity(STATE_PREFIX.len() + 2 + partition.len() + key.len());
        out.extend_from_slice(STATE_PREFIX);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(partition.as_bytes());
        out.extend_from_slice(key);
        Ok(out)
    }

    /// Inverse of [`Storage::state_key`].
    pub fn split_state_key(raw: &[u8]) -> Result<(String, Vec<u8>)> {
        let corrupted = || StoreError::Corrupted(format!("bad state key {:?}", raw));
        let rest = raw.strip_prefix(STATE_PREFIX).ok_or_else(corrupted)?;
        if rest.len() < 2 {
            return Err(corrupted());
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let rest = &rest[2..];
        if rest.len() < len {
            return Err(corrupted());
        }
        let partition = std::str::from_utf8(&rest[..len])
            .map_err(|_| corrupted())?
            .to_string();
        Ok((partition, rest[len..].to_vec()))
    }

    /// All committed state entries in key order.
    pub fn scan_state(&self) -> Result<Vec<(String, Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(STATE_PREFIX) {
            let (key, value) = item?;
            let (partition, key) = Self::split_state_key(&key)?;
            entries.push((partition, key, value.to_vec()));
        }
        Ok(entries)
    }

    pub fn latest_version(&self) -> Result<Option<u64>> {
        self.get(META_VERSION_KEY)
    }

    pub fn latest_root(&self) -> Result<Option<[u8; 32]>> {
        self.get(META_ROOT_KEY)
    }

    /// Metadata ops to append to a commit batch.
    pub fn meta_ops(version: u64, root: &[u8; 32]) -> Result<Vec<BatchOp>> {
        Ok(vec![
            BatchOp::Insert {
                key: META_VERSION_KEY.to_vec(),
                value: bincode::serialize(&version)?,
            },
            BatchOp::Insert {
                key: META_ROOT_KEY.to_vec(),
                value: bincode::serialize(root)?,
            },
        ])
    }
}

/// Batch operation for atomic updates.
pub enum BatchOp {
    Insert { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}
