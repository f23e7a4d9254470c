//! Sims delivery command.

use crate::node::Node;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use ledgerflow_appmanager::AppManagerError;
use ledgerflow_core::{BlockRequest, HeaderInfo};
use ledgerflow_modules::{sim_accounts, TransferGenerator};
use ledgerflow_stf::{CancelToken, StfError};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Args)]
pub struct SimsArgs {
    /// Directory to store node data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Number of blocks to deliver
    #[arg(short, long, default_value = "1")]
    blocks: u64,

    /// Transactions generated per block
    #[arg(short, long, default_value = "100")]
    txs: u64,

    /// Number of sims accounts, as passed to `init`
    #[arg(short, long, default_value = "4")]
    accounts: usize,

    /// Upper bound on a single transfer
    #[arg(long, default_value = "1000")]
    max_amount: u64,

    /// Random seed; block `i` uses `seed + i`
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Cancel the run after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

pub fn run(args: SimsArgs) -> Result<()> {
    let node = Node::open(&args.data_dir)?;
    let cancel = CancelToken::new();
    if let Some(secs) = args.timeout {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            cancel.cancel();
        });
    }

    println!("{}", "Running sims...".bold().cyan());
    println!();

    for i in 0..args.blocks {
        let height = node.app.latest_version() + 1;
        let block = BlockRequest::new(HeaderInfo::at_height(node.config.chain_id.clone(), height), Vec::new());
        let generator = TransferGenerator::new(sim_accounts(args.accounts), args.seed.wrapping_add(i), args.txs)
            .with_max_amount(args.max_amount);

        let (response, writer) = match node.app.deliver_sims(&block, &cancel, generator.into_fn()) {
            Ok(delivered) => delivered,
            Err(AppManagerError::Stf(StfError::Cancelled)) => {
                println!(
                    "{}  Cancelled at height {}; nothing committed",
                    "!".yellow().bold(),
                    height
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let info = node.app.commit(writer)?;

        println!(
            "{}  Height {}: {} txs, {} failed, {} gas",
            "✓".green().bold(),
            height.to_string().bright_cyan(),
            response.tx_results.len(),
            response.failed_count().to_string().bright_red(),
            response.gas_used()
        );
        println!("    Root: {}", info.root.to_string().bright_black());
    }

    println!();
    println!(
        "Latest version: {}",
        node.app.latest_version().to_string().bright_cyan()
    );
    Ok(())
}
