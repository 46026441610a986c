mod cli;

use crate::cli::{Cli, Command};
use clap::Parser;
use crc_bundle::Repository;
use crc_config::Config;
use miette::{IntoDiagnostic, miette};
use std::fmt::Debug;
use tracing_subscriber::EnvFilter;

/// Render an error tree (location and causes included) for the terminal.
fn report(err: impl Debug) -> miette::Report {
    miette!("{err:?}")
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log_level)).into_diagnostic()?;
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    // Built once and handed to every operation below.
    let repo = Repository::from(&config);
    tracing::debug!(?repo, "bundle repository");

    match cli.command {
        Command::Extract { archive } => {
            let bundle = repo.extract_and_use(&archive).map_err(report)?;
            println!("{}", bundle.cached_path().display());
        },
        Command::Use { name } => {
            let bundle = repo.cached_bundle_info(&name).map_err(report)?;
            if let Some(exposed) = bundle.exposed_path() {
                println!("{}", exposed.display());
            }
        },
        Command::Info { name } => {
            let bundle = repo.get(&name).map_err(report)?;
            println!("cached path: {}", bundle.cached_path().display());
            println!("{}", serde_json::to_string_pretty(bundle.metadata()).into_diagnostic()?);
        },
    }
    Ok(())
}
