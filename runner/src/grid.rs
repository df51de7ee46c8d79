use crate::config::{ExperimentConfig, SweepConfig};
use itertools::{iproduct, Itertools};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variable storage layout inside the netCDF file.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Contiguous,
    Chunked,
}

impl StorageMode {
    /// token accepted by the benchmark's `--storage_mode` flag
    pub fn token(self) -> &'static str {
        match self {
            Self::Contiguous => "NC_CONTIGUOUS",
            Self::Chunked => "NC_CHUNKED",
        }
    }
}

/// On-disk file format, the benchmark's `--netcdf_version` flag.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileFormat {
    #[serde(rename = "netcdf4_hdf5")]
    NetCdf4Hdf5,
    #[serde(rename = "cdf5")]
    Cdf5,
    #[serde(rename = "classic")]
    Classic,
}

impl FileFormat {
    pub fn token(self) -> &'static str {
        match self {
            Self::NetCdf4Hdf5 => "netcdf4_hdf5",
            Self::Cdf5 => "cdf5",
            Self::Classic => "classic",
        }
    }

    /// Not every format can be written through every access pattern:
    /// only netcdf4/hdf5 supports shared-file parallel writes, cdf5 is
    /// written by one file per process and classic by the multifile
    /// fallback. Invalid pairings are dropped during enumeration, they
    /// never appear in the sweep at all.
    pub fn supports(self, access: MpiAccess) -> bool {
        match self {
            Self::NetCdf4Hdf5 => true,
            Self::Cdf5 => access == MpiAccess::FilePerProcess,
            Self::Classic => access == MpiAccess::Multifile,
        }
    }
}

/// MPI access pattern, the benchmark's `--mpi_access` flag.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MpiAccess {
    Independent,
    Collective,
    FilePerProcess,
    Multifile,
}

impl MpiAccess {
    pub fn token(self) -> &'static str {
        match self {
            Self::Independent => "NC_INDEPENDENT",
            Self::Collective => "NC_COLLECTIVE",
            Self::FilePerProcess => "file_per_process",
            Self::Multifile => "multifile",
        }
    }
}

/// One point of the sweep.
///
/// Value equality over all fields drives both de-duplication and the
/// working directory mapping in [`crate::workdir`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Configuration {
    pub repetition: u32,
    pub nodes: u32,
    pub tasks_per_node: u32,
    pub storage_mode: StorageMode,
    pub format: FileFormat,
    pub mpi_access: MpiAccess,
    pub variables: u32,
    pub bytes_hint: u64,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rep {} {}x{} {} {} {} vars {} bytes {}",
            self.repetition,
            self.nodes,
            self.tasks_per_node,
            self.format.token(),
            self.storage_mode.token(),
            self.mpi_access.token(),
            self.variables,
            self.bytes_hint
        )
    }
}

/// Expand one sweep block in its fixed nesting order: repetition, access
/// pattern, storage mode, format, then the shape grids. Re-running the
/// driver relies on this order being stable so completed configurations
/// are skipped in place.
pub fn expand_sweep(sweep: &SweepConfig) -> impl Iterator<Item = Configuration> + '_ {
    (0..sweep.repetitions).flat_map(move |repetition| {
        iproduct!(
            sweep.mpi_access.iter().copied(),
            sweep.storage_modes.iter().copied(),
            sweep.formats.iter().copied()
        )
        .filter(|&(access, _, format)| format.supports(access))
        .flat_map(move |(mpi_access, storage_mode, format)| {
            sweep.shapes.iter().flat_map(move |shape| {
                iproduct!(
                    shape.nodes.iter().copied(),
                    shape.tasks_per_node.iter().copied()
                )
                .map(move |(nodes, tasks_per_node)| Configuration {
                    repetition,
                    nodes,
                    tasks_per_node,
                    storage_mode,
                    format,
                    mpi_access,
                    variables: sweep.variables,
                    bytes_hint: sweep.bytes_hint,
                })
            })
        })
    })
}

/// The raw enumeration over all sweep blocks. Shape grids of one sweep
/// may overlap, so the sequence can contain duplicates; consumers act
/// on [`unique_configurations`] instead.
pub fn configurations(experiment: &ExperimentConfig) -> impl Iterator<Item = Configuration> + '_ {
    experiment.sweeps.iter().flat_map(expand_sweep)
}

/// First-seen de-duplication of [`configurations`]. Both the driver and
/// the extractor walk this sequence, in this order, so resumption and
/// result extraction line up with the submitted chain.
pub fn unique_configurations(
    experiment: &ExperimentConfig,
) -> impl Iterator<Item = Configuration> + '_ {
    configurations(experiment).unique()
}
