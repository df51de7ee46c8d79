use crate::{
    config::{BenchmarkConfig, EsdmConfig, ExperimentConfig},
    grid::Configuration,
    workdir::{APPARENT_STORAGE_FILE, QUEUED_FILE, SENTINEL_FILE, STORAGE_FILE},
};
use std::fmt::Write as _;

/// The benchmark argv under the distributed launcher. Kept as a list so
/// flags are assembled from typed values instead of spliced into a
/// string; the values are enum tokens and integers, nothing a shell
/// could misread.
pub fn srun_args(benchmark: &BenchmarkConfig, config: &Configuration) -> Vec<String> {
    vec![
        benchmark.exec.to_string_lossy().into_owned(),
        format!("--num_element_wise_variables={}", config.variables),
        format!("--pseudo_random:bytes={}", config.bytes_hint),
        format!("--netcdf_version={}", config.format.token()),
        format!("--storage_mode={}", config.storage_mode.token()),
        format!("--mpi_access={}", config.mpi_access.token()),
    ]
}

/// The command string handed to `sbatch --wrap` for one benchmark run.
///
/// The sentinel is written only if the benchmark exits successfully,
/// the storage accounting and the queued-marker removal run either way.
pub fn benchmark_script(experiment: &ExperimentConfig, config: &Configuration) -> String {
    let mut script = match experiment.esdm {
        Some(ref esdm) => esdm_prologue(esdm),
        None => module_prologue(&experiment.benchmark.modules),
    };

    let _ = write!(
        script,
        "; srun {} && echo 1 >{SENTINEL_FILE}",
        srun_args(&experiment.benchmark, config).join(" ")
    );

    // ESDM owns the data files, there is nothing on scratch to measure
    if experiment.esdm.is_none() {
        let glob = format!("{}*", experiment.benchmark.output_base);
        let _ = write!(
            script,
            "; du -c --apparent-size --block-size=1 {glob} >{APPARENT_STORAGE_FILE}"
        );
        let _ = write!(script, "; du -c --block-size=1 {glob} >{STORAGE_FILE}");
    }

    let _ = write!(script, "; rm -f {QUEUED_FILE}");
    script
}

/// Reclaims scratch space behind a finished run.
pub fn cleanup_script(benchmark: &BenchmarkConfig) -> String {
    format!("find -name \"{}*\" -delete", benchmark.output_base)
}

fn module_prologue(modules: &[String]) -> String {
    format!("module load {}", modules.join(" "))
}

/// Re-format the ESDM storage before the run so every measurement
/// starts from an empty container.
fn esdm_prologue(esdm: &EsdmConfig) -> String {
    format!(
        "cd {}; {} -g -l --create --remove --ignore-errors; cd -",
        esdm.storage_location.display(),
        esdm.install.join("bin/mkfs.esdm").display()
    )
}
