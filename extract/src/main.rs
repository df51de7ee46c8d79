mod results;
mod table;

use cdfmark_runner::config::{ConfigErrors, ExperimentConfig};
use clap::Parser;
use results::ExtractError;
use std::{io, path::PathBuf, process::ExitCode};
use thiserror::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Join the sweep's working directories into a CSV summary on stdout;
/// configurations without a completion sentinel are reported on stderr
/// and skipped.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// experiment definition the sweep was launched with
    #[arg(short, long, default_value = "experiment.yaml")]
    config: PathBuf,
    /// directory holding the per-run working directories
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[derive(Error, Debug)]
enum ExtractorError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

fn run(cli: &Cli) -> Result<(), ExtractorError> {
    let experiment = ExperimentConfig::load(&cli.config)?;
    let stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    table::write_summary(&experiment, &cli.root, stdout, &mut stderr)?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
