//! macgranny CLI - Command-line interface for GR2 inspection

pub mod commands;

use clap::Parser;
use commands::Commands;

#[derive(Parser)]
#[command(name = "macgranny")]
#[command(about = "macgranny: Granny2 (GR2) file inspection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Run the macgranny CLI
pub fn run_cli() -> anyhow::Result<()> {
    // Setup logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cli.command.execute()?;

    Ok(())
}
