use crate::{
    config::ExperimentConfig,
    driver::{self, LaunchError},
    grid,
    slurm::{JobId, SbatchRequest, Submit, SubmitError},
    workdir,
};
use itertools::Itertools;
use std::fs;

/// Hands out deterministic ids and records every request, so the chain
/// the driver builds can be asserted on without a queue.
#[derive(Default)]
struct FakeQueue {
    requests: Vec<SbatchRequest>,
    reject_at: Option<usize>,
}

impl Submit for FakeQueue {
    fn submit(&mut self, request: &SbatchRequest) -> Result<JobId, SubmitError> {
        if self.reject_at == Some(self.requests.len()) {
            return Err(SubmitError::UnparsableJobId("sbatch: error".to_string()));
        }
        self.requests.push(request.clone());
        Ok(JobId(100 + self.requests.len() as u64 - 1))
    }
}

fn two_point_experiment(cleanup: bool) -> ExperimentConfig {
    serde_yaml::from_str(&format!(
        "benchmark:
  exec: /usr/bin/true
cleanup: {cleanup}
sweeps:
  - repetitions: 1
    mpi_access: [independent]
    storage_modes: [contiguous]
    formats: [netcdf4_hdf5]
    shapes:
      - nodes: [1, 2]
        tasks_per_node: [1]
    variables: 1
    bytes_hint: 1000
"
    ))
    .unwrap()
}

#[test]
pub fn chains_one_job_per_configuration() {
    let experiment = two_point_experiment(false);
    let root = tempfile::tempdir().unwrap();
    let mut queue = FakeQueue::default();

    let summary = driver::launch(&experiment, root.path(), false, &mut queue).unwrap();

    assert_eq!(summary.submitted, 2);
    assert_eq!(summary.last_job, Some(JobId(101)));
    assert_eq!(queue.requests.len(), 2);
    assert_eq!(queue.requests[0].after, None);
    assert_eq!(queue.requests[1].after, Some(JobId(100)));

    // every submission left its id in the queued marker
    let dirs = grid::unique_configurations(&experiment)
        .map(|config| workdir::derive(root.path(), &config))
        .collect_vec();
    assert_eq!(fs::read_to_string(dirs[0].join("queued")).unwrap(), "100\n");
    assert_eq!(fs::read_to_string(dirs[1].join("queued")).unwrap(), "101\n");
}

#[test]
pub fn cleanup_jobs_interleave_with_benchmarks() {
    let experiment = two_point_experiment(true);
    let root = tempfile::tempdir().unwrap();
    let mut queue = FakeQueue::default();

    let summary = driver::launch(&experiment, root.path(), false, &mut queue).unwrap();

    assert_eq!(summary.submitted, 2);
    assert_eq!(queue.requests.len(), 4);

    // benchmark, its cleanup, next benchmark behind the cleanup
    assert_eq!(queue.requests[0].after, None);
    assert_eq!(queue.requests[1].after, Some(JobId(100)));
    assert_eq!(queue.requests[2].after, Some(JobId(101)));
    assert_eq!(queue.requests[3].after, Some(JobId(102)));

    assert!(queue.requests[1].script.starts_with("find -name"));
    assert_eq!(queue.requests[1].nodes, None);
    assert_eq!(queue.requests[1].mem_per_cpu_kb, None);
    assert_eq!(summary.last_job, Some(JobId(103)));
}

#[test]
pub fn completed_configuration_is_left_alone() {
    let experiment = two_point_experiment(false);
    let root = tempfile::tempdir().unwrap();
    let first_dir = grid::unique_configurations(&experiment)
        .map(|config| workdir::derive(root.path(), &config))
        .next()
        .unwrap();
    fs::create_dir_all(&first_dir).unwrap();
    fs::write(first_dir.join("success"), "1\n").unwrap();

    let mut queue = FakeQueue::default();
    let summary = driver::launch(&experiment, root.path(), false, &mut queue).unwrap();

    assert_eq!(summary.skipped_complete, 1);
    assert_eq!(summary.submitted, 1);
    // the skip did not thread a dependency into the next submission
    assert_eq!(queue.requests.len(), 1);
    assert_eq!(queue.requests[0].after, None);
    assert!(!first_dir.join("queued").exists());
}

#[test]
pub fn queued_marker_blocks_resubmission() {
    let experiment = two_point_experiment(false);
    let root = tempfile::tempdir().unwrap();
    let first_dir = grid::unique_configurations(&experiment)
        .map(|config| workdir::derive(root.path(), &config))
        .next()
        .unwrap();
    fs::create_dir_all(&first_dir).unwrap();
    fs::write(first_dir.join("queued"), "97\n").unwrap();

    let mut queue = FakeQueue::default();
    let summary = driver::launch(&experiment, root.path(), false, &mut queue).unwrap();

    assert_eq!(summary.skipped_in_flight, 1);
    assert_eq!(summary.submitted, 1);

    // --resubmit opts back into retrying the marked configuration
    let mut queue = FakeQueue::default();
    let summary = driver::launch(&experiment, root.path(), true, &mut queue).unwrap();
    assert_eq!(summary.skipped_in_flight, 0);
    assert_eq!(summary.submitted, 2);
}

#[test]
pub fn submission_failure_aborts_the_pass() {
    let experiment = two_point_experiment(false);
    let root = tempfile::tempdir().unwrap();
    let mut queue = FakeQueue {
        reject_at: Some(1),
        ..FakeQueue::default()
    };

    let result = driver::launch(&experiment, root.path(), false, &mut queue);

    assert!(matches!(result, Err(LaunchError::Submit(_))));
    // the first job went out before the abort, the second never did
    assert_eq!(queue.requests.len(), 1);
    let second_dir = grid::unique_configurations(&experiment)
        .map(|config| workdir::derive(root.path(), &config))
        .nth(1)
        .unwrap();
    assert!(!second_dir.join("queued").exists());
}

#[test]
pub fn resource_requests_follow_the_configuration() {
    let experiment = two_point_experiment(false);
    let root = tempfile::tempdir().unwrap();
    let mut queue = FakeQueue::default();

    driver::launch(&experiment, root.path(), false, &mut queue).unwrap();

    assert_eq!(queue.requests[0].nodes, Some(1));
    assert_eq!(queue.requests[0].tasks_per_node, Some(1));
    // tiny bytes_hint clamps to the floor
    assert_eq!(queue.requests[0].mem_per_cpu_kb, Some(10_000));
    assert_eq!(queue.requests[0].time_limit, "10:00");
    assert_eq!(queue.requests[0].constraint.as_deref(), Some("scratch"));
}

#[test]
pub fn esdm_mode_copies_conf_and_skips_cleanup() {
    let root = tempfile::tempdir().unwrap();
    let conf = root.path().join("esdm.conf");
    fs::write(&conf, "esdm settings\n").unwrap();

    let experiment: ExperimentConfig = serde_yaml::from_str(&format!(
        "benchmark:
  exec: /usr/bin/true
cleanup: true
esdm:
  storage_location: /scratch/esdm
  install: /opt/esdm
  conf: {}
sweeps:
  - repetitions: 1
    mpi_access: [independent]
    storage_modes: [contiguous]
    formats: [netcdf4_hdf5]
    shapes:
      - nodes: [1]
        tasks_per_node: [1]
    variables: 1
    bytes_hint: 1000
",
        conf.display()
    ))
    .unwrap();

    let mut queue = FakeQueue::default();
    let summary = driver::launch(&experiment, root.path(), false, &mut queue).unwrap();

    // no cleanup job despite cleanup: true, ESDM owns the data files
    assert_eq!(queue.requests.len(), 1);
    assert_eq!(summary.submitted, 1);

    let dir = grid::unique_configurations(&experiment)
        .map(|config| workdir::derive(root.path(), &config))
        .next()
        .unwrap();
    assert_eq!(
        fs::read_to_string(dir.join("esdm.conf")).unwrap(),
        "esdm settings\n"
    );
}
