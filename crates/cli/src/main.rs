//! ledgerflow CLI entry point.

use clap::Parser;
use tracing::Level;

mod commands;
mod node;

#[derive(Parser)]
#[command(name = "ledgerflow")]
#[command(about = "Deterministic state-transition engine node", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("ledgerflow - deterministic state-transition engine");
            println!("Run 'ledgerflow --help' for usage information.");
        }
    }
}
