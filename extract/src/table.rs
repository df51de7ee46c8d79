use crate::results::{self, ExtractError, RunMetrics};
use cdfmark_runner::{
    config::ExperimentConfig,
    grid::{self, Configuration},
    workdir,
};
use serde::Serialize;
use std::{io::Write, path::Path};

/// One summary line. Field order is the column order; configurations
/// come first so rows sort like the sweep enumerates.
#[derive(Serialize, Debug)]
struct SummaryRow {
    nodes: u32,
    tasks_per_node: u32,
    storage_mode: &'static str,
    cmode: &'static str,
    comm_mode: &'static str,
    num_element_wise_variables: u32,
    repetition: u32,
    actual_information_bytes: Option<u64>,
    seconds: f64,
    #[serde(rename = "throughput_B/s")]
    throughput_bytes_per_second: Option<f64>,
}

impl SummaryRow {
    fn new(config: &Configuration, metrics: &RunMetrics) -> Self {
        Self {
            nodes: config.nodes,
            tasks_per_node: config.tasks_per_node,
            storage_mode: config.storage_mode.token(),
            cmode: config.format.token(),
            comm_mode: config.mpi_access.token(),
            num_element_wise_variables: config.variables,
            repetition: config.repetition,
            actual_information_bytes: metrics.actual_information_bytes,
            seconds: metrics.seconds,
            throughput_bytes_per_second: metrics.throughput_bytes_per_second,
        }
    }
}

/// Join the sweep enumeration with the on-disk outcomes: one CSV row
/// per completed configuration on `out`, one diagnostic line per
/// unfinished one on `err`.
///
/// Working directories are re-derived through [`workdir::derive`], the
/// same rule the driver used, so the join cannot drift from what was
/// actually submitted.
pub fn write_summary<W: Write, E: Write>(
    experiment: &ExperimentConfig,
    root: &Path,
    out: W,
    err: &mut E,
) -> Result<(), ExtractError> {
    let mut csv = csv::Writer::from_writer(out);

    for config in grid::unique_configurations(experiment) {
        let dir = workdir::derive(root, &config);
        if !workdir::is_complete(&dir) {
            writeln!(err, "{} failed", dir.display())?;
            continue;
        }

        let metrics = results::read(&dir)?;
        csv.serialize(SummaryRow::new(&config, &metrics))?;
    }

    csv.flush().map_err(ExtractError::Output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn one_point_experiment() -> ExperimentConfig {
        serde_yaml::from_str(
            "benchmark:
  exec: /usr/bin/true
sweeps:
  - repetitions: 1
    mpi_access: [collective]
    storage_modes: [chunked]
    formats: [netcdf4_hdf5]
    shapes:
      - nodes: [64]
        tasks_per_node: [20]
    variables: 300
    bytes_hint: 1000000000000
",
        )
        .unwrap()
    }

    fn run_summary(experiment: &ExperimentConfig, root: &Path) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        write_summary(experiment, root, &mut out, &mut err).unwrap();
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn emits_one_row_per_completed_configuration() {
        let experiment = one_point_experiment();
        let root = tempfile::tempdir().unwrap();
        let dir = grid::unique_configurations(&experiment)
            .map(|config| workdir::derive(root.path(), &config))
            .next()
            .unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("success"), "1\n").unwrap();
        fs::write(
            dir.join("results.json"),
            r#"{"actual_information_bytes": 1200, "seconds": 2.5, "throughput_B/s": 480.0}"#,
        )
        .unwrap();

        let (out, err) = run_summary(&experiment, root.path());

        assert_eq!(
            out,
            "nodes,tasks_per_node,storage_mode,cmode,comm_mode,num_element_wise_variables,repetition,actual_information_bytes,seconds,throughput_B/s\n\
             64,20,NC_CHUNKED,netcdf4_hdf5,NC_COLLECTIVE,300,0,1200,2.5,480.0\n"
        );
        assert!(err.is_empty());
    }

    #[test]
    fn missing_sentinel_yields_one_diagnostic_line() {
        let experiment = one_point_experiment();
        let root = tempfile::tempdir().unwrap();
        let dir = grid::unique_configurations(&experiment)
            .map(|config| workdir::derive(root.path(), &config))
            .next()
            .unwrap();
        fs::create_dir_all(&dir).unwrap();

        let (_, err) = run_summary(&experiment, root.path());

        let lines: Vec<_> = err.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(dir.to_str().unwrap()));
        assert!(lines[0].ends_with("failed"));
    }

    #[test]
    fn scraped_rows_leave_unknown_columns_empty() {
        let experiment = one_point_experiment();
        let root = tempfile::tempdir().unwrap();
        let dir = grid::unique_configurations(&experiment)
            .map(|config| workdir::derive(root.path(), &config))
            .next()
            .unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("success"), "1\n").unwrap();
        fs::write(
            dir.join("slurm-8.out"),
            "The time elapsed to write the netCDF-4 File is: 31.5\n",
        )
        .unwrap();

        let (out, _) = run_summary(&experiment, root.path());

        assert!(out.ends_with("64,20,NC_CHUNKED,netcdf4_hdf5,NC_COLLECTIVE,300,0,,31.5,\n"));
    }
}
