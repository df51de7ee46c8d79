use crate::{
    config::ExperimentConfig,
    grid, script,
    slurm::{mem_per_cpu_kb, JobId, SbatchRequest, Submit, SubmitError},
    workdir,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to prepare working directory {}: {source}", .path.display())]
    Workdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// What one driver pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LaunchSummary {
    pub submitted: usize,
    pub skipped_complete: usize,
    pub skipped_in_flight: usize,
    /// tail of the job chain, the id new submissions would depend on
    pub last_job: Option<JobId>,
}

/// Walk the de-duplicated sweep in enumeration order and realize every
/// unfinished configuration as a chained batch job.
///
/// The previous job id is threaded through the loop as a plain
/// accumulator; each submission depends on the job before it reaching
/// any terminal state, so the queue never runs two benchmarks at once
/// and a failed run cannot stall the chain. A submission failure aborts
/// immediately and leaves the chain built so far queued.
pub fn launch<S: Submit>(
    experiment: &ExperimentConfig,
    root: &Path,
    resubmit: bool,
    submitter: &mut S,
) -> Result<LaunchSummary, LaunchError> {
    let mut summary = LaunchSummary::default();
    let mut chain: Option<JobId> = None;

    for config in grid::unique_configurations(experiment) {
        let dir = workdir::derive(root, &config);
        prepare_workdir(experiment, &dir)?;

        if workdir::is_complete(&dir) {
            info!(%config, "skipping completed configuration");
            summary.skipped_complete += 1;
            continue;
        }
        if workdir::is_queued(&dir) && !resubmit {
            // could still be in flight; sentinel absence alone cannot
            // tell "running" from "failed"
            warn!(
                path = %dir.display(),
                "previous submission has not reported back, pass --resubmit to retry it"
            );
            summary.skipped_in_flight += 1;
            continue;
        }

        info!(%config, "scheduling configuration");
        let job = submitter.submit(&SbatchRequest {
            time_limit: experiment.sbatch.time_limit.clone(),
            constraint: experiment.sbatch.constraint.clone(),
            nodes: Some(config.nodes),
            tasks_per_node: Some(config.tasks_per_node),
            mem_per_cpu_kb: Some(mem_per_cpu_kb(
                config.bytes_hint,
                config.nodes,
                config.tasks_per_node,
                experiment.sbatch.mem_per_cpu_floor_kb,
            )),
            after: chain,
            workdir: dir.clone(),
            script: script::benchmark_script(experiment, &config),
        })?;
        workdir::record_queued(&dir, job).map_err(|source| LaunchError::Workdir {
            path: dir.clone(),
            source,
        })?;
        chain = Some(job);
        summary.submitted += 1;

        if experiment.cleanup && experiment.esdm.is_none() {
            // reclaim scratch before the next run takes its place in
            // the chain
            chain = Some(submitter.submit(&SbatchRequest {
                time_limit: experiment.sbatch.cleanup_time_limit.clone(),
                constraint: experiment.sbatch.constraint.clone(),
                nodes: None,
                tasks_per_node: None,
                mem_per_cpu_kb: None,
                after: chain,
                workdir: dir,
                script: script::cleanup_script(&experiment.benchmark),
            })?);
        }
    }

    summary.last_job = chain;
    Ok(summary)
}

fn prepare_workdir(experiment: &ExperimentConfig, dir: &Path) -> Result<(), LaunchError> {
    let with_path = |source| LaunchError::Workdir {
        path: dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(with_path)?;
    if let Some(ref esdm) = experiment.esdm {
        let file_name = esdm.conf.file_name().unwrap_or(esdm.conf.as_os_str());
        fs::copy(&esdm.conf, dir.join(file_name)).map_err(with_path)?;
    }
    Ok(())
}
