//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod init;
mod query;
mod serve;
mod sims;
mod status;

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a data directory with a genesis state
    Init(init::InitArgs),
    /// Deliver blocks of randomly generated transfers
    Sims(sims::SimsArgs),
    /// Query committed state
    Query(query::QueryArgs),
    /// Show the latest committed version
    Status(status::StatusArgs),
    /// Run the front-end servers until interrupted
    Serve(serve::ServeArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init(args) => init::run(args),
        Commands::Sims(args) => sims::run(args),
        Commands::Query(args) => query::run(args),
        Commands::Status(args) => status::run(args),
        Commands::Serve(args) => serve::run(args),
    }
}
