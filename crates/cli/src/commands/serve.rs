//! Serve command: runs the front-end servers until Ctrl-C.

use crate::node::Node;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use ledgerflow_core::SignedTx;
use ledgerflow_server::{RestServer, ServerManager};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ServeArgs {
    /// Directory to store node data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Override the REST listen address
    #[arg(long)]
    rest_address: Option<String>,
}

pub fn run(args: ServeArgs) -> Result<()> {
    let mut node = Node::open(&args.data_dir)?;
    if let Some(address) = args.rest_address {
        node.config.rest.address = address;
    }

    let mut servers = ServerManager::<SignedTx>::new();
    servers.register(RestServer::new())?;
    servers.init(node.app.clone(), &node.config.servers())?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        servers.start()?;
        println!(
            "{}  Serving {} at version {}",
            "✓".green().bold(),
            servers.names().join(", ").bright_cyan(),
            node.app.latest_version()
        );
        if node.config.rest.enable {
            println!("    REST: http://{}", node.config.rest.address.bright_yellow());
        }
        println!("Press Ctrl-C to stop.");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Shutting down");
        servers.stop()?;
        anyhow::Ok(())
    })
}
