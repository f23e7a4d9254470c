//! State query command.

use crate::node::Node;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use ledgerflow_appmanager::{AppManagerError, StateVersion};
use ledgerflow_core::{Address, Message, TypedMessage};
use ledgerflow_modules::auth::{QueryAccount, QueryAccountResponse};
use ledgerflow_modules::bank::{QueryBalance, QueryBalanceResponse};
use ledgerflow_stf::{CancelToken, StfError, TxError};
use std::path::PathBuf;

#[derive(Args)]
pub struct QueryArgs {
    /// Directory to store node data
    #[arg(short, long, default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Version to read; latest when omitted
    #[arg(long, global = true)]
    height: Option<u64>,

    #[command(subcommand)]
    command: QueryCommand,
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Balance of an account
    Balance {
        /// Account address (hex format)
        address: String,
    },
    /// Nonce of an account
    Account {
        /// Account address (hex format)
        address: String,
    },
}

pub fn run(args: QueryArgs) -> Result<()> {
    let node = Node::open(&args.data_dir)?;
    let version = StateVersion::from(args.height);

    match args.command {
        QueryCommand::Balance { address } => {
            let address = parse_address(&address)?;
            let response: QueryBalanceResponse = query(&node, version, &QueryBalance { address })?
                .unpack()
                .context("Unexpected query response")?;
            println!("{}", "Balance:".bold().cyan());
            println!("  Address: {}", address.to_hex().bright_yellow());
            println!("  Balance: {}", response.balance.to_string().bright_green());
        }
        QueryCommand::Account { address } => {
            let address = parse_address(&address)?;
            match query(&node, version, &QueryAccount { address }) {
                Ok(message) => {
                    let response: QueryAccountResponse =
                        message.unpack().context("Unexpected query response")?;
                    println!("{}", "Account:".bold().cyan());
                    println!("  Address: {}", address.to_hex().bright_yellow());
                    println!("  Nonce:   {}", response.nonce.to_string().bright_cyan());
                }
                Err(AppManagerError::Stf(StfError::Execution(TxError::NotFound(_)))) => {
                    println!(
                        "{}  Account {} has not sent any transaction",
                        "!".yellow().bold(),
                        address.to_hex()
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

fn parse_address(s: &str) -> Result<Address> {
    Address::from_hex(s).with_context(|| format!("Invalid address: {}", s))
}

fn query<M: TypedMessage>(
    node: &Node,
    version: StateVersion,
    request: &M,
) -> std::result::Result<Message, AppManagerError> {
    node.app
        .query(version, 0, &Message::pack(request), &CancelToken::new())
}
