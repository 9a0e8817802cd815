//! indexsync CLI: durable queue of index-maintenance actions.
//!
//! Records actions locally and forwards them to the indexing backend from a
//! background worker.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
