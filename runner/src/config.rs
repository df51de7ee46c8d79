use crate::grid::{FileFormat, MpiAccess, StorageMode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        let metadata = File::open(path).and_then(|file| file.metadata())?;
        Ok((metadata.mode() & 0o111) != 0)
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("failed to read experiment definition: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse experiment definition: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("experiment definition failed preflight checks")]
    Preflight,
}

/// The experiment definition: which benchmark to run, how to ask slurm
/// for resources, and the parameter space to sweep.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub sbatch: SbatchConfig,
    // chain a scratch-reclaim job behind every benchmark job
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,
    #[serde(default)]
    pub esdm: Option<EsdmConfig>,
    #[serde(default = "default_sweeps")]
    pub sweeps: Vec<SweepConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// path to the t8cdfmark executable on the cluster
    pub exec: PathBuf,
    /// base name of the files the benchmark writes, used for the `du`
    /// accounting and the cleanup job
    #[serde(default = "default_output_base")]
    pub output_base: String,
    /// environment modules loaded before `srun`
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SbatchConfig {
    /// wall clock limit for one benchmark job
    #[serde(default = "default_time_limit")]
    pub time_limit: String,
    /// wall clock limit for one cleanup job
    #[serde(default = "default_cleanup_time_limit")]
    pub cleanup_time_limit: String,
    /// slurm feature constraint, e.g. nodes with scratch access
    #[serde(default = "default_constraint")]
    pub constraint: Option<String>,
    /// lower clamp for the per-CPU memory request
    #[serde(default = "default_mem_per_cpu_floor_kb")]
    pub mem_per_cpu_floor_kb: u64,
}

impl Default for SbatchConfig {
    fn default() -> Self {
        Self {
            time_limit: default_time_limit(),
            cleanup_time_limit: default_cleanup_time_limit(),
            constraint: default_constraint(),
            mem_per_cpu_floor_kb: default_mem_per_cpu_floor_kb(),
        }
    }
}

/// Running against ESDM instead of a plain scratch filesystem. The
/// storage is re-formatted before every run and the benchmark reads its
/// ESDM settings from a config file copied into the working directory.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct EsdmConfig {
    pub storage_location: PathBuf,
    /// install prefix containing bin/mkfs.esdm
    pub install: PathBuf,
    #[serde(default = "default_esdm_conf")]
    pub conf: PathBuf,
}

/// One block of the sweep: fixed mode axes crossed with a list of
/// (nodes x tasks_per_node) shape grids.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    pub mpi_access: Vec<MpiAccess>,
    pub storage_modes: Vec<StorageMode>,
    pub formats: Vec<FileFormat>,
    pub shapes: Vec<ShapeGrid>,
    pub variables: u32,
    pub bytes_hint: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ShapeGrid {
    pub nodes: Vec<u32>,
    pub tasks_per_node: Vec<u32>,
}

impl ExperimentConfig {
    /// read and parse the experiment definition
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Validate the whole definition up front. Problems are logged
    /// one by one instead of failing on the first, so a user can fix
    /// their config in a single round; returns whether any were found.
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        match check_executable(&self.benchmark.exec) {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    "benchmark.exec {} is not executable",
                    self.benchmark.exec.to_string_lossy()
                );
                contains_error = true;
            }
            Err(e) => {
                error!(
                    "failed to check benchmark.exec {}: {e}",
                    self.benchmark.exec.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if self.benchmark.output_base.is_empty() {
            error!("benchmark.output_base is empty, the cleanup job would delete everything");
            contains_error = true;
        }

        if self.sweeps.is_empty() {
            error!("no sweep blocks defined, nothing would be submitted");
            contains_error = true;
        }

        for (index, sweep) in self.sweeps.iter().enumerate() {
            if sweep.repetitions == 0 {
                error!("sweeps[{index}].repetitions is 0, the block yields nothing");
                contains_error = true;
            }
            if sweep.mpi_access.is_empty()
                || sweep.storage_modes.is_empty()
                || sweep.formats.is_empty()
            {
                error!("sweeps[{index}] has an empty mode axis");
                contains_error = true;
            }
            if sweep.shapes.is_empty()
                || sweep
                    .shapes
                    .iter()
                    .any(|shape| shape.nodes.is_empty() || shape.tasks_per_node.is_empty())
            {
                error!("sweeps[{index}] has an empty shape grid");
                contains_error = true;
            }
            for format in &sweep.formats {
                if !sweep.mpi_access.iter().any(|&access| format.supports(access)) {
                    error!(
                        "sweeps[{index}] format {} pairs with none of the configured access modes",
                        format.token()
                    );
                    contains_error = true;
                }
            }
            if sweep.bytes_hint == 0 {
                warn!("sweeps[{index}].bytes_hint is 0, the memory request falls back to the floor");
            }
        }

        if let Some(ref esdm) = self.esdm {
            if !esdm.conf.is_file() {
                error!("esdm.conf {} not found", esdm.conf.to_string_lossy());
                contains_error = true;
            }
            let mkfs = esdm.install.join("bin/mkfs.esdm");
            if !mkfs.is_file() {
                error!("{} not found under esdm.install", mkfs.to_string_lossy());
                contains_error = true;
            }
            if self.cleanup {
                warn!("cleanup jobs are skipped in ESDM mode, the storage is re-formatted per run");
            }
        }

        contains_error
    }
}

fn default_cleanup() -> bool {
    true
}

fn default_output_base() -> String {
    "t8_netcdf_performance_test".to_string()
}

fn default_modules() -> Vec<String> {
    vec!["netcdf-c".to_string(), "openmpi".to_string()]
}

fn default_time_limit() -> String {
    "10:00".to_string()
}

fn default_cleanup_time_limit() -> String {
    "5:00".to_string()
}

fn default_constraint() -> Option<String> {
    Some("scratch".to_string())
}

fn default_mem_per_cpu_floor_kb() -> u64 {
    10_000
}

fn default_esdm_conf() -> PathBuf {
    PathBuf::from("esdm.conf")
}

fn default_repetitions() -> u32 {
    3
}

/// The stock experiment: a scaling sweep over node counts and tasks
/// per node, followed by a "good defaults" sweep that writes a terabyte
/// from 64x20 processes with many variables.
fn default_sweeps() -> Vec<SweepConfig> {
    let mpi_access = vec![
        MpiAccess::Independent,
        MpiAccess::Collective,
        MpiAccess::FilePerProcess,
    ];
    let storage_modes = vec![StorageMode::Contiguous, StorageMode::Chunked];
    let formats = vec![FileFormat::NetCdf4Hdf5, FileFormat::Cdf5];

    vec![
        SweepConfig {
            repetitions: default_repetitions(),
            mpi_access: mpi_access.clone(),
            storage_modes: storage_modes.clone(),
            formats: formats.clone(),
            shapes: vec![
                ShapeGrid {
                    nodes: vec![1, 4, 16, 64],
                    tasks_per_node: vec![10],
                },
                // deliberately overlaps the node scaling at 16x10; the
                // enumeration is de-duplicated downstream
                ShapeGrid {
                    nodes: vec![16],
                    tasks_per_node: vec![1, 10, 20],
                },
            ],
            variables: 10,
            bytes_hint: 100_000_000_000,
        },
        SweepConfig {
            repetitions: default_repetitions(),
            mpi_access,
            storage_modes,
            formats,
            shapes: vec![ShapeGrid {
                nodes: vec![64],
                tasks_per_node: vec![20],
            }],
            variables: 300,
            bytes_hint: 1_000_000_000_000,
        },
    ]
}
