//! IncidentScout CLI — IT incident research pipeline.
//!
//! Searches the structured incident database for past cases matching a
//! query and falls back to external knowledge gathering when nothing
//! matches, producing a Markdown research report either way.

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
