use anyhow::{Context, Result};
use env_logger::Env;
use log::info;

use phaserunner_logger::cli::commands::{build_cli, handle_subcommand};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let (name, sub_matches) = matches
        .subcommand()
        .context("a subcommand is required")?;

    let level = if sub_matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    info!("🖥️  PhaseRunner logger v{}", phaserunner_logger::VERSION);
    handle_subcommand(name, sub_matches).await
}
