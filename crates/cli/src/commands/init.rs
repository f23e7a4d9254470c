//! Initialize data directory command.

use crate::node::{Node, NodeConfig, CONFIG_FILE};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use ledgerflow_modules::{sim_accounts, GenesisState};
use std::fs;
use std::path::PathBuf;

#[derive(Args)]
pub struct InitArgs {
    /// Directory to store node data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Chain identifier
    #[arg(long, default_value = "ledgerflow-local")]
    chain_id: String,

    /// Genesis file to load instead of generating sims accounts
    #[arg(short, long)]
    genesis: Option<PathBuf>,

    /// Number of deterministic sims accounts to fund
    #[arg(short, long, default_value = "4")]
    accounts: usize,

    /// Genesis balance of every sims account
    #[arg(short, long, default_value = "1000000")]
    balance: u64,

    /// Address of the REST server
    #[arg(long)]
    rest_address: Option<String>,
}

pub fn run(args: InitArgs) -> Result<()> {
    println!("{}", "Initializing ledgerflow...".bold().cyan());
    println!();

    let genesis = match &args.genesis {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read genesis file: {}", path.display()))?;
            GenesisState::from_json(&json)?
        }
        None => sim_accounts(args.accounts)
            .iter()
            .fold(GenesisState::new(args.chain_id.clone()), |genesis, keypair| {
                genesis.with_account(keypair.address(), args.balance)
            }),
    };

    let mut config = NodeConfig::new(genesis.chain_id.clone());
    if let Some(address) = args.rest_address {
        config.rest.address = address;
    }

    let (node, info) = Node::init(&args.data_dir, config, &genesis)?;

    println!("{}  Created data directory", "✓".green().bold());
    println!(
        "{}  Funded {} accounts",
        "✓".green().bold(),
        genesis.accounts.len().to_string().bright_cyan()
    );
    for account in &genesis.accounts {
        println!(
            "    {}  {}",
            account.address.to_hex().bright_yellow(),
            account.balance
        );
    }

    println!();
    println!("{}  Committed genesis", "✓".green().bold());
    println!("    Chain:   {}", node.config.chain_id.bright_cyan());
    println!("    Version: {}", info.version.to_string().bright_cyan());
    println!("    Root:    {}", info.root.to_string().bright_yellow());
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        args.data_dir.join(CONFIG_FILE).display().to_string().bright_black()
    );

    println!();
    println!("{}", "Node initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to deliver generated blocks",
        "ledgerflow sims".bright_cyan()
    );
    println!(
        "  • Use {} to inspect balances",
        "ledgerflow query balance".bright_cyan()
    );
    println!(
        "  • Use {} to expose the REST API",
        "ledgerflow serve".bright_cyan()
    );

    Ok(())
}
