//! # ledgerflow-server
//!
//! Front-end servers that expose an [`AppManager`](ledgerflow_appmanager::AppManager)
//! to clients. Every server implements [`Server`]; a [`ServerManager`]
//! configures, starts and stops them together.
//!
//! ```rust,no_run
//! use ledgerflow_appmanager::{AppManager, AppManagerConfig};
//! use ledgerflow_core::{BincodeCodec, SignedTx};
//! use ledgerflow_modules::build_stf;
//! use ledgerflow_server::{RestServer, ServerManager};
//! use ledgerflow_stf::StfConfig;
//! use ledgerflow_storage::{StoreConfig, VersionedStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(VersionedStore::in_memory(StoreConfig::default()));
//! let app = AppManager::new(AppManagerConfig::default(), store, build_stf(StfConfig::default())?, BincodeCodec);
//!
//! let mut servers = ServerManager::<SignedTx>::new();
//! servers.register(RestServer::new())?;
//! servers.init(Arc::new(app), &serde_json::json!({}))?;
//! servers.start()?;
//! # Ok(())
//! # }
//! ```

pub mod rest;
pub mod server;

pub use rest::{RestConfig, RestServer};
pub use server::{Result, Server, ServerError, ServerManager};
