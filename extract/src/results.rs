use globset::GlobBuilder;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// structured per-run output written by newer benchmark builds
pub const RESULTS_FILE: &str = "results.json";

/// fixed line older builds print into the job log instead
pub const ELAPSED_PREFIX: &str = "The time elapsed to write the netCDF-4 File is: ";

const SLURM_LOG_GLOB: &str = "slurm-*";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {}: {source}", .path.display())]
    MalformedResults {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Glob(#[from] globset::Error),
    #[error("{} completed but holds neither results.json nor a timed job log", .path.display())]
    NoMetrics { path: PathBuf },
    #[error("{} holds more than one elapsed-time line, refusing to guess", .path.display())]
    AmbiguousMetrics { path: PathBuf },
    #[error("unparsable elapsed time in {}: {line:?}", .path.display())]
    MalformedElapsed { path: PathBuf, line: String },
    #[error("failed to serialize a summary row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Metrics of one completed run. The log-scrape fallback only recovers
/// the elapsed time, the byte and throughput columns stay empty then.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetrics {
    pub actual_information_bytes: Option<u64>,
    pub seconds: f64,
    pub throughput_bytes_per_second: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct ResultsJson {
    actual_information_bytes: u64,
    seconds: f64,
    #[serde(rename = "throughput_B/s")]
    throughput_bytes_per_second: f64,
}

/// Metrics for a working directory whose sentinel is present. Missing
/// or malformed data here is a hard error: the run claims success, so
/// silently dropping it would skew the summary.
pub fn read(workdir: &Path) -> Result<RunMetrics, ExtractError> {
    let json_path = workdir.join(RESULTS_FILE);
    if json_path.is_file() {
        let contents = fs::read(&json_path).map_err(|source| ExtractError::Io {
            path: json_path.clone(),
            source,
        })?;
        let parsed: ResultsJson =
            serde_json::from_slice(&contents).map_err(|source| ExtractError::MalformedResults {
                path: json_path,
                source,
            })?;
        return Ok(RunMetrics {
            actual_information_bytes: Some(parsed.actual_information_bytes),
            seconds: parsed.seconds,
            throughput_bytes_per_second: Some(parsed.throughput_bytes_per_second),
        });
    }

    scrape_elapsed(workdir)
}

fn scrape_elapsed(workdir: &Path) -> Result<RunMetrics, ExtractError> {
    let matcher = GlobBuilder::new(SLURM_LOG_GLOB).build()?.compile_matcher();
    let with_path = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ExtractError::Io { path, source }
    };

    let mut logs: Vec<PathBuf> = fs::read_dir(workdir)
        .map_err(with_path(workdir))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| matcher.is_match(Path::new(name)))
                .unwrap_or(false)
        })
        .collect();
    logs.sort();

    let mut seconds = None;
    for log in logs {
        let contents = fs::read_to_string(&log).map_err(with_path(&log))?;
        for line in contents.lines() {
            if let Some(index) = line.find(ELAPSED_PREFIX) {
                let value = line[index + ELAPSED_PREFIX.len()..].trim();
                let parsed = value.parse().map_err(|_| ExtractError::MalformedElapsed {
                    path: log.clone(),
                    line: line.to_string(),
                })?;
                if seconds.replace(parsed).is_some() {
                    return Err(ExtractError::AmbiguousMetrics {
                        path: workdir.to_path_buf(),
                    });
                }
            }
        }
    }

    match seconds {
        Some(seconds) => Ok(RunMetrics {
            actual_information_bytes: None,
            seconds,
            throughput_bytes_per_second: None,
        }),
        None => Err(ExtractError::NoMetrics {
            path: workdir.to_path_buf(),
        }),
    }
}
