//! neurotopics CLI — Neurosynth dataset conversion and topic annotation.
//!
//! Downloads the Neurosynth corpus, converts it into a dataset, and annotates
//! it with per-topic weights read from saved topic pages.

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
