//! Node status command.

use crate::node::Node;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct StatusArgs {
    /// Directory to store node data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let node = Node::open(&args.data_dir)?;
    let config = &node.config;

    println!("{}", "Node Status:".bold().cyan());
    println!();
    println!("  Chain:          {}", config.chain_id.bright_cyan());
    println!(
        "  Latest version: {}",
        node.app.latest_version().to_string().bright_cyan()
    );
    println!(
        "  Oldest version: {}",
        node.app.oldest_version().to_string().bright_black()
    );
    println!(
        "  Root hash:      {}",
        node.app.latest_root().to_string().bright_yellow()
    );
    println!();
    println!("{}", "Config:".bold());
    println!("  Keep recent:    {}", config.store.keep_recent);
    println!("  Max block gas:  {}", config.stf.max_block_gas);
    println!("  Consensus id:   {}", config.stf.consensus_identity.to_hex());
    let rest = if config.rest.enable {
        config.rest.address.green()
    } else {
        "disabled".bright_black()
    };
    println!("  REST:           {}", rest);
    Ok(())
}
