use cdfmark_runner::{
    config::{ConfigErrors, ExperimentConfig},
    driver::{self, LaunchError, LaunchSummary},
    slurm::{DryRun, Sbatch},
};
use clap::Parser;
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Submit one chained slurm job per sweep configuration, skipping
/// configurations that already completed.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// experiment definition
    #[arg(short, long, default_value = "experiment.yaml")]
    config: PathBuf,
    /// directory holding the per-run working directories
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// log the submissions instead of calling sbatch
    #[arg(long)]
    dry_run: bool,
    /// resubmit configurations whose queued marker is still present
    #[arg(long)]
    resubmit: bool,
}

#[derive(Error, Debug)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

fn run(cli: &Cli) -> Result<LaunchSummary, RunnerError> {
    let experiment = ExperimentConfig::load(&cli.config)?;
    // dry runs proceed past preflight failures, nothing gets submitted
    // anyway and the log already names every problem
    if experiment.preflight_checks() && !cli.dry_run {
        return Err(ConfigErrors::Preflight.into());
    }

    let summary = if cli.dry_run {
        driver::launch(&experiment, &cli.root, cli.resubmit, &mut DryRun::default())?
    } else {
        driver::launch(&experiment, &cli.root, cli.resubmit, &mut Sbatch)?
    };
    Ok(summary)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(summary) => {
            info!(
                submitted = summary.submitted,
                skipped_complete = summary.skipped_complete,
                skipped_in_flight = summary.skipped_in_flight,
                last_job = summary.last_job.map(|job| job.0),
                "sweep pass finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            // on a submission failure the chain submitted so far stays
            // queued and needs manual inspection
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
