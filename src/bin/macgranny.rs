//! macgranny command-line binary

fn main() -> anyhow::Result<()> {
    macgranny::cli::run_cli()
}
