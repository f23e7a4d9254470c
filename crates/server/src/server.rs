//! The contract every front-end server implements, and the manager that
//! drives a set of them.

use ledgerflow_appmanager::AppManager;
use ledgerflow_core::Transaction;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Errors that can occur while configuring or running servers.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid config for {name}: {source}")]
    Config {
        name: &'static str,
        source: serde_json::Error,
    },

    #[error("server {0} was started before init")]
    NotInitialized(&'static str),

    #[error("server {0} registered twice")]
    DuplicateName(&'static str),

    #[error("no async runtime available to start {0}")]
    NoRuntime(&'static str),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// A front-end that exposes the App Manager to the outside.
///
/// Servers only ever call the App Manager; they never reach the store or the
/// engine directly.
pub trait Server<T: Transaction>: Send {
    /// Unique name; also the key of this server's section in a config file.
    fn name(&self) -> &'static str;

    /// Bind the server to `app`. `config` is this server's section, if any;
    /// missing fields take their defaults.
    fn init(&mut self, app: Arc<AppManager<T>>, config: Option<&Value>) -> Result<()>;

    /// Start serving in the background and return immediately. Failures after
    /// this returns are logged.
    fn start(&mut self) -> Result<()>;

    /// Release listening resources. Safe to call when `start` failed or never
    /// ran.
    fn stop(&mut self) -> Result<()>;

    /// Current config, or the default before `init`.
    fn config(&self) -> Value;
}

/// Starts, stops and configures a set of servers as one unit.
pub struct ServerManager<T: Transaction> {
    servers: Vec<Box<dyn Server<T>>>,
}

impl<T: Transaction> ServerManager<T> {
    pub fn new() -> Self {
        Self {
            servers: Vec::new(),
        }
    }

    /// Add a server. Names must be unique.
    pub fn register(&mut self, server: impl Server<T> + 'static) -> Result<()> {
        let name = server.name();
        if self.servers.iter().any(|s| s.name() == name) {
            return Err(ServerError::DuplicateName(name));
        }
        self.servers.push(Box::new(server));
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.servers.iter().map(|s| s.name()).collect()
    }

    /// Init every server with its section of `configs`, a JSON object keyed
    /// by server name.
    pub fn init(&mut self, app: Arc<AppManager<T>>, configs: &Value) -> Result<()> {
        for server in &mut self.servers {
            server.init(Arc::clone(&app), configs.get(server.name()))?;
        }
        Ok(())
    }

    /// Start every server in registration order.
    pub fn start(&mut self) -> Result<()> {
        for server in &mut self.servers {
            info!(server = server.name(), "Starting server");
            server.start()?;
        }
        Ok(())
    }

    /// Stop every server in reverse order. All servers are asked to stop even
    /// if one fails; the first error is returned.
    pub fn stop(&mut self) -> Result<()> {
        let mut first_err = None;
        for server in self.servers.iter_mut().rev() {
            if let Err(e) = server.stop() {
                error!(server = server.name(), error = %e, "Failed to stop server");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Config of every server, keyed by name.
    pub fn configs(&self) -> BTreeMap<String, Value> {
        self.servers
            .iter()
            .map(|s| (s.name().to_string(), s.config()))
            .collect()
    }
}

impl<T: Transaction> Default for ServerManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
