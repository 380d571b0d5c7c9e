//! Catalog enricher CLI.
//!
//! Adds technical specifications and generated marketing copy to a product
//! catalog, resuming from a checkpoint after interruptions.

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
