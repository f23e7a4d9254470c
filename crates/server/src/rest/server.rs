//! The REST server lifecycle.

use super::routes::create_router;
use crate::server::{Result, Server, ServerError};
use ledgerflow_appmanager::AppManager;
use ledgerflow_core::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Name of the REST server, and of its config section.
pub const SERVER_NAME: &str = "rest";

/// REST server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub enable: bool,
    /// Listen address, `host:port`.
    pub address: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            enable: true,
            address: "127.0.0.1:1317".to_string(),
        }
    }
}

/// JSON-over-HTTP front-end for validate, simulate and query.
pub struct RestServer<T: Transaction> {
    config: Option<RestConfig>,
    app: Option<Arc<AppManager<T>>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<T: Transaction> RestServer<T> {
    pub fn new() -> Self {
        Self {
            config: None,
            app: None,
            shutdown: None,
            task: None,
        }
    }

    /// Preset the config used when `init` gets no section of its own.
    pub fn with_config(mut self, config: RestConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the listener task to exit, after [`Server::stop`] or a
    /// failure.
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "REST server task panicked");
            }
        }
    }
}

impl<T: Transaction> Default for RestServer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transaction> Server<T> for RestServer<T> {
    fn name(&self) -> &'static str {
        SERVER_NAME
    }

    fn init(&mut self, app: Arc<AppManager<T>>, config: Option<&Value>) -> Result<()> {
        let config = match config {
            Some(section) => serde_json::from_value(section.clone()).map_err(|source| {
                ServerError::Config {
                    name: SERVER_NAME,
                    source,
                }
            })?,
            None => self.config.clone().unwrap_or_default(),
        };
        self.config = Some(config);
        self.app = Some(app);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let (Some(config), Some(app)) = (&self.config, &self.app) else {
            return Err(ServerError::NotInitialized(SERVER_NAME));
        };
        if !config.enable {
            info!("REST server disabled");
            return Ok(());
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ServerError::NoRuntime(SERVER_NAME))?;

        let router = create_router(Arc::clone(app));
        let address = config.address.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = runtime.spawn(async move {
            let listener = match TcpListener::bind(address.as_str()).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(address = %address, error = %e, "Failed to bind REST server");
                    return;
                }
            };
            info!(address = %address, "REST server listening");

            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "REST server error");
            }
        });

        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            info!("Stopping REST server");
            let _ = shutdown.send(());
        }
        Ok(())
    }

    fn config(&self) -> Value {
        let config = self.config.clone().unwrap_or_default();
        serde_json::to_value(config).expect("serialization should not fail")
    }
}
