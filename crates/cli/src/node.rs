//! On-disk node layout shared by the commands.
//!
//! ```text
//! <data_dir>/
//!   config.json    NodeConfig
//!   genesis.json   GenesisState used by `init`
//!   state/         sled database of the versioned store
//! ```

use anyhow::{bail, Context, Result};
use ledgerflow_appmanager::{AppManager, AppManagerConfig};
use ledgerflow_core::{BincodeCodec, HeaderInfo, SignedTx};
use ledgerflow_modules::{build_stf, GenesisState};
use ledgerflow_server::RestConfig;
use ledgerflow_stf::{CancelToken, StfConfig};
use ledgerflow_storage::{CommitInfo, StoreConfig, VersionedStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const CONFIG_FILE: &str = "config.json";
pub const GENESIS_FILE: &str = "genesis.json";
const STATE_DIR: &str = "state";

/// Everything a node needs to reopen its data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub chain_id: String,
    pub store: StoreConfig,
    pub stf: StfConfig,
    pub app: AppManagerConfig,
    pub rest: RestConfig,
}

impl NodeConfig {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            store: StoreConfig::default(),
            stf: StfConfig::default(),
            app: AppManagerConfig::default(),
            rest: RestConfig::default(),
        }
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read {}. Did you run 'ledgerflow init'?",
                path.display()
            )
        })?;
        serde_json::from_str(&json).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Server sections keyed by server name.
    pub fn servers(&self) -> serde_json::Value {
        let mut servers = serde_json::Map::new();
        servers.insert(
            ledgerflow_server::rest::SERVER_NAME.to_string(),
            serde_json::to_value(&self.rest).expect("serialization should not fail"),
        );
        serde_json::Value::Object(servers)
    }
}

/// An opened data directory.
pub struct Node {
    pub config: NodeConfig,
    pub app: Arc<AppManager<SignedTx>>,
}

impl Node {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let config = NodeConfig::load(data_dir)?;
        Self::open_with(data_dir, config)
    }

    fn open_with(data_dir: &Path, config: NodeConfig) -> Result<Self> {
        let store = VersionedStore::open(data_dir.join(STATE_DIR), config.store)
            .with_context(|| format!("Failed to open state in {}", data_dir.display()))?;
        let stf = build_stf(StfConfig {
            chain_id: config.chain_id.clone(),
            ..config.stf.clone()
        })?;
        let app = AppManager::new(config.app, Arc::new(store), stf, BincodeCodec);
        Ok(Self {
            config,
            app: Arc::new(app),
        })
    }

    /// Create a data directory, write its config and commit `genesis` as
    /// version 1.
    pub fn init(data_dir: &Path, config: NodeConfig, genesis: &GenesisState) -> Result<(Self, CommitInfo)> {
        if data_dir.join(CONFIG_FILE).exists() {
            bail!("{} is already initialized", data_dir.display());
        }
        if genesis.chain_id != config.chain_id {
            bail!(
                "genesis chain id {} does not match config chain id {}",
                genesis.chain_id,
                config.chain_id
            );
        }
        genesis.validate()?;

        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        let node = Self::open_with(data_dir, config)?;

        let header = HeaderInfo::at_height(node.config.chain_id.clone(), 1);
        let (_, writer) = node
            .app
            .init_genesis(header, Vec::new(), &CancelToken::new(), |ctx| genesis.apply(ctx))?;
        let info = node.app.commit(writer)?;

        fs::write(data_dir.join(GENESIS_FILE), genesis.to_json())?;
        node.config.save(data_dir)?;
        Ok((node, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_core::Address;

    fn genesis(chain_id: &str) -> GenesisState {
        GenesisState::new(chain_id).with_account(Address::from_label("alice"), 1_000)
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::new("roundtrip");
        config.rest.enable = false;
        config.save(dir.path()).unwrap();
        assert_eq!(NodeConfig::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_missing_config_mentions_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = NodeConfig::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("ledgerflow init"));
    }

    #[test]
    fn test_init_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("node");
        let root = {
            let (node, info) = Node::init(&data_dir, NodeConfig::new("local"), &genesis("local")).unwrap();
            assert_eq!(info.version, 1);
            assert_eq!(node.app.latest_version(), 1);
            info.root
        };

        let node = Node::open(&data_dir).unwrap();
        assert_eq!(node.config.chain_id, "local");
        assert_eq!(node.app.latest_version(), 1);
        assert_eq!(node.app.latest_root(), root);
        assert_eq!(node.app.stf().config().chain_id, "local");
        assert!(data_dir.join(GENESIS_FILE).exists());
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        Node::init(dir.path(), NodeConfig::new("local"), &genesis("local")).unwrap();
        assert!(Node::init(dir.path(), NodeConfig::new("local"), &genesis("local")).is_err());
    }

    #[test]
    fn test_init_rejects_chain_id_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Node::init(dir.path(), NodeConfig::new("a"), &genesis("b")).is_err());
        assert!(!dir.path().join(CONFIG_FILE).exists());
    }
}
