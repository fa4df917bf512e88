use anyhow::Result;
use clap::Parser;
use tunejit::cli::{Cli, run_cli};

fn main() -> Result<()> {
    run_cli(Cli::parse())
}
