use clap::Subcommand;
use std::path::PathBuf;

// Command implementation modules
pub mod inspect;

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect a GR2 file and dump its structure
    #[command(long_about = "Inspect a GR2 file and dump its structure

Loads the file (decompressing every sector), then prints the header,
file info, sector table and the parsed element tree.

Examples:
  macgranny inspect mesh.gr2
  macgranny inspect mesh.gr2 --output mesh.json")]
    Inspect {
        /// GR2 file to inspect
        path: PathBuf,

        /// Write a JSON summary to this path instead of printing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub fn execute(self) -> anyhow::Result<()> {
        match self {
            Commands::Inspect { path, output } => inspect::inspect(&path, output.as_deref()),
        }
    }
}
