use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use deposit_planner::api::{Cli, run};

fn main() -> anyhow::Result<()> {
    // stdout carries the JSON result, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = run(cli)?;
    println!("{output}");
    Ok(())
}
