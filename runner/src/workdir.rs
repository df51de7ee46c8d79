use crate::{grid::Configuration, slurm::JobId};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Marker written by the job script once the benchmark exited
/// successfully. Its presence is the single source of truth for "this
/// configuration is done".
pub const SENTINEL_FILE: &str = "success";

/// Marker holding the job id of a submission that has not reported
/// back yet. Written by the driver right after `sbatch` accepts the
/// job, removed by the job script as its very last step.
pub const QUEUED_FILE: &str = "queued";

/// `du` output of the benchmark's files with `--apparent-size`
pub const APPARENT_STORAGE_FILE: &str = "apparent_storage";
/// `du` output of the benchmark's files, actual blocks on disk
pub const STORAGE_FILE: &str = "storage";

/// The working directory for one configuration, relative to the sweep
/// root.
///
/// This is the only place the path layout is spelled out; the driver
/// and the extractor both resolve directories through here so the two
/// cannot drift apart. The mapping must stay injective over the
/// enumerated space, distinct configurations sharing a directory would
/// silently shadow each other's results.
pub fn derive(root: &Path, config: &Configuration) -> PathBuf {
    root.join(format!(
        "nodes{}-tasks_per_node{}",
        config.nodes, config.tasks_per_node
    ))
    .join(format!(
        "{}-{}-{}-{}-{}",
        config.format.token(),
        config.storage_mode.token(),
        config.mpi_access.token(),
        config.variables,
        config.bytes_hint
    ))
    .join(config.repetition.to_string())
}

pub fn is_complete(workdir: &Path) -> bool {
    workdir.join(SENTINEL_FILE).is_file()
}

pub fn is_queued(workdir: &Path) -> bool {
    workdir.join(QUEUED_FILE).is_file()
}

pub fn record_queued(workdir: &Path, job: JobId) -> io::Result<()> {
    fs::write(workdir.join(QUEUED_FILE), format!("{job}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ExperimentConfig, grid};
    use itertools::Itertools;
    use std::collections::HashSet;

    fn sample() -> Configuration {
        Configuration {
            repetition: 0,
            nodes: 16,
            tasks_per_node: 10,
            storage_mode: grid::StorageMode::Contiguous,
            format: grid::FileFormat::NetCdf4Hdf5,
            mpi_access: grid::MpiAccess::Independent,
            variables: 10,
            bytes_hint: 100_000_000_000,
        }
    }

    #[test]
    fn layout_matches_convention() {
        let path = derive(Path::new("."), &sample());
        assert_eq!(
            path,
            Path::new(
                "./nodes16-tasks_per_node10/netcdf4_hdf5-NC_CONTIGUOUS-NC_INDEPENDENT-10-100000000000/0"
            )
        );
    }

    #[test]
    fn injective_over_default_experiment() {
        let experiment: ExperimentConfig =
            serde_yaml::from_str("benchmark:\n  exec: /usr/bin/true\n").unwrap();
        let configs = grid::unique_configurations(&experiment).collect_vec();
        let paths: HashSet<_> = configs
            .iter()
            .map(|config| derive(Path::new("."), config))
            .collect();

        assert_eq!(paths.len(), configs.len());
    }
}
