use std::{
    fmt,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
};
use thiserror::Error;
use tracing::{debug, info};

/// Numeric job identifier handed out by `sbatch --parsable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("failed to spawn sbatch")]
    Spawn(#[from] std::io::Error),
    // the queue refused the job; the chain submitted so far stays queued
    #[error("sbatch failed ({status}): {stdout} {stderr}")]
    Rejected {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    #[error("sbatch returned an unparsable job id: {0:?}")]
    UnparsableJobId(String),
}

/// One `sbatch` call, fully typed before it is rendered to argv. Values
/// come from enum tokens and integers only, so nothing here needs shell
/// quoting.
#[derive(Clone, Debug)]
pub struct SbatchRequest {
    pub time_limit: String,
    pub constraint: Option<String>,
    pub nodes: Option<u32>,
    pub tasks_per_node: Option<u32>,
    pub mem_per_cpu_kb: Option<u64>,
    /// start only after this job reached a terminal state, success or
    /// failure; a failed run must not stall the rest of the chain
    pub after: Option<JobId>,
    /// directory the job is submitted from and runs in
    pub workdir: PathBuf,
    /// shell command passed through `--wrap`
    pub script: String,
}

impl SbatchRequest {
    /// argv following the `sbatch` program name
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--parsable".to_string(), format!("--time={}", self.time_limit)];
        if let Some(ref constraint) = self.constraint {
            args.push(format!("--constraint={constraint}"));
        }
        if let Some(nodes) = self.nodes {
            args.push(format!("--nodes={nodes}"));
        }
        if let Some(tasks_per_node) = self.tasks_per_node {
            args.push(format!("--ntasks-per-node={tasks_per_node}"));
        }
        if let Some(mem) = self.mem_per_cpu_kb {
            args.push(format!("--mem-per-cpu={mem}KB"));
        }
        if let Some(job) = self.after {
            args.push(format!("--dependency=afterany:{job}"));
        }
        args.push(format!("--wrap={}", self.script));
        args
    }
}

/// Memory request per CPU in KB: twice the uncompressed payload split
/// over all tasks, never below the configured floor.
pub fn mem_per_cpu_kb(bytes_hint: u64, nodes: u32, tasks_per_node: u32, floor_kb: u64) -> u64 {
    (bytes_hint * 2 / (u64::from(nodes) * u64::from(tasks_per_node) * 1000)).max(floor_kb)
}

/// Seam between the driver and the batch queue, so the sweep logic is
/// testable without a cluster.
pub trait Submit {
    fn submit(&mut self, request: &SbatchRequest) -> Result<JobId, SubmitError>;
}

/// Submits through the real `sbatch` binary.
#[derive(Debug, Default)]
pub struct Sbatch;

impl Submit for Sbatch {
    fn submit(&mut self, request: &SbatchRequest) -> Result<JobId, SubmitError> {
        let args = request.to_args();
        debug!(workdir = %request.workdir.display(), ?args, "invoking sbatch");

        let output = Command::new("sbatch")
            .args(&args)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(SubmitError::Rejected {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_job_id(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Logs submissions instead of performing them and hands out sequential
/// ids, for `--dry-run`.
#[derive(Debug, Default)]
pub struct DryRun {
    next: u64,
}

impl Submit for DryRun {
    fn submit(&mut self, request: &SbatchRequest) -> Result<JobId, SubmitError> {
        let job = JobId(self.next);
        self.next += 1;
        info!(
            workdir = %request.workdir.display(),
            args = ?request.to_args(),
            %job,
            "dry run, not submitting"
        );
        Ok(job)
    }
}

/// `--parsable` prints `jobid` or `jobid;cluster`, plus a trailing
/// newline.
fn parse_job_id(stdout: &str) -> Result<JobId, SubmitError> {
    stdout
        .trim()
        .split(';')
        .next()
        .unwrap_or_default()
        .parse()
        .map(JobId)
        .map_err(|_| SubmitError::UnparsableJobId(stdout.to_string()))
}
