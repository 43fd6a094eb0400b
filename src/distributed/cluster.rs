//! In-process cluster
//!
//! Runs every rank inside the current process. Worker ranks are node
//! services on in-memory duplex links, so a standalone run goes through
//! exactly the same handshake and message flow as a multi-host run.

use super::coordinator::{DistributedCoordinator, RunReport};
use super::node_service::NodeService;
use crate::config::Config;
use crate::engine::ConvolutionEngine;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Buffer size of each in-memory link
const LINK_BUFFER_SIZE: usize = 64 * 1024;

/// All ranks of a run in one process
pub struct LocalCluster {
    config: Arc<Config>,
    engine: Arc<dyn ConvolutionEngine>,
}

impl LocalCluster {
    pub fn new(config: Arc<Config>, engine: Arc<dyn ConvolutionEngine>) -> Self {
        Self { config, engine }
    }

    /// Number of ranks, coordinator included
    pub fn world_size(&self) -> usize {
        self.config.cluster.processes
    }

    /// Run the pipeline across `world_size` ranks
    ///
    /// The coordinator's error wins when several ranks fail; a worker error is
    /// only returned when the coordinator itself succeeded.
    pub async fn run(&self) -> Result<RunReport> {
        let world_size = self.world_size();
        if world_size == 0 {
            anyhow::bail!("A cluster needs at least one process");
        }

        let mut links = Vec::with_capacity(world_size - 1);
        let mut nodes = Vec::with_capacity(world_size - 1);
        for rank in 1..world_size {
            let (coordinator_end, node_end) = tokio::io::duplex(LINK_BUFFER_SIZE);
            links.push(coordinator_end);

            let service = NodeService::new(0, self.engine.clone(), self.config.workers.threads)?
                .with_node_id(format!("local-{}", rank));
            nodes.push(tokio::spawn(async move { service.handle_run(node_end).await }));
        }

        let coordinator = DistributedCoordinator::new(self.config.clone(), self.engine.clone());
        let result = match coordinator.handshake(links).await {
            Ok(comm) => coordinator.run(comm).await,
            Err(e) => Err(e),
        };

        let mut node_error = None;
        for (i, handle) in nodes.into_iter().enumerate() {
            let rank = i + 1;
            match handle.await.with_context(|| format!("Rank {} panicked", rank)) {
                Ok(Ok(stats)) => {
                    tracing::debug!(rank, targets = stats.local_targets, "Local rank finished");
                }
                Ok(Err(e)) | Err(e) => {
                    tracing::debug!(rank, "Local rank failed: {:#}", e);
                    node_error.get_or_insert(e.context(format!("Rank {} failed", rank)));
                }
            }
        }

        let report = result?;
        match node_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::direct::DirectEngine;
    use crate::engine::mock::MockEngine;
    use crate::engine::{create_engine, EngineType};
    use crate::matrix::data_range;
    use crate::matrix::generate::{write_input_file, GenerateConfig};
    use crate::matrix::input::InputReader;
    use crate::matrix::Shape;
    use crate::stats::summarize;
    use std::path::Path;

    fn config(input: &Path, processes: usize) -> Arc<Config> {
        let mut config = Config {
            input: Some(input.to_path_buf()),
            ..Config::default()
        };
        config.cluster.processes = processes;
        Arc::new(config)
    }

    fn generate(dir: &Path, num_targets: usize, seed: u64) -> std::path::PathBuf {
        let path = dir.join(format!("input-{}-{}.txt", num_targets, seed));
        let generate = GenerateConfig {
            kernel_shape: Shape::new(3, 2),
            target_shape: Shape::new(6, 5),
            num_targets,
            min_value: -20,
            max_value: 20,
            seed,
        };
        write_input_file(&generate, &path).unwrap();
        path
    }

    /// Per-target metrics computed serially, in index order
    fn serial_metrics(path: &Path) -> Vec<i64> {
        let engine = DirectEngine::new();
        let mut reader = InputReader::open(path).unwrap();
        let header = reader.read_header().unwrap();
        (0..header.num_targets)
            .map(|_| {
                let target = reader.next_target().unwrap();
                let convolved = engine.convolve(&header.kernel, &target).unwrap();
                data_range(&convolved).unwrap()
            })
            .collect()
    }

    async fn run(path: &Path, processes: usize) -> Result<RunReport> {
        LocalCluster::new(config(path, processes), Arc::new(DirectEngine::new()))
            .run()
            .await
    }

    #[tokio::test]
    async fn test_worked_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        // 1x1 kernel [1]: each metric is the target's own data range
        let input = "1 1\n1\n3 2 2\n1 2\n3 4\n\n0 0\n0 7\n\n-5 5\n0 0\n";
        std::fs::write(&path, input).unwrap();

        let report = run(&path, 2).await.unwrap();
        assert_eq!(report.world_size, 2);
        assert_eq!(report.local_counts, vec![1, 2]);
        assert_eq!(report.summary.minimum, 3);
        assert_eq!(report.summary.maximum, 10);
        assert_eq!(report.summary.median, 7);
        assert_eq!(report.summary.floored_mean, 6);
    }

    #[tokio::test]
    async fn test_same_summary_for_any_world_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), 10, 5);
        let expected = summarize(serial_metrics(&path)).unwrap();

        for processes in 1..=4 {
            let report = run(&path, processes).await.unwrap();
            assert_eq!(report.summary, expected, "world size {}", processes);
            assert_eq!(report.local_counts.iter().sum::<usize>(), 10);
        }
    }

    #[tokio::test]
    async fn test_uneven_partition() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), 10, 8);

        let report = run(&path, 3).await.unwrap();
        assert_eq!(report.local_counts, vec![3, 3, 4]);
        assert_eq!(report.metadata.num_targets, 10);
        assert_eq!(report.metadata.kernel_shape, Shape::new(3, 2));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), 13, 21);

        let first = run(&path, 3).await.unwrap();
        let second = run(&path, 3).await.unwrap();
        assert_eq!(first.summary, second.summary);
    }

    #[tokio::test]
    async fn test_bounded_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), 9, 2);
        let expected = summarize(serial_metrics(&path)).unwrap();

        let mut config = (*config(&path, 2)).clone();
        config.workers.threads = Some(1);
        let report = LocalCluster::new(Arc::new(config), Arc::new(DirectEngine::new()))
            .run()
            .await
            .unwrap();
        assert_eq!(report.summary, expected);
    }

    #[tokio::test]
    async fn test_every_target_convolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), 7, 3);
        let engine = MockEngine::new();

        LocalCluster::new(config(&path, 3), Arc::new(engine.clone()))
            .run()
            .await
            .unwrap();
        assert_eq!(engine.call_count(), 7);
    }

    #[tokio::test]
    async fn test_mock_engine_reports_raw_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        // Kernel is ignored by the identity engine
        std::fs::write(&path, "1 2\n5 -5\n3 1 2\n1 4\n-2 8\n0 0\n").unwrap();

        let engine = create_engine(EngineType::Mock);
        let report = LocalCluster::new(config(&path, 2), engine).run().await.unwrap();
        assert_eq!(report.engine, "mock");
        assert_eq!(report.summary.minimum, 0);
        assert_eq!(report.summary.maximum, 10);
        assert_eq!(report.summary.median, 3);
        assert_eq!(report.summary.floored_mean, 4);
    }

    #[tokio::test]
    async fn test_overflowing_range_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "1 1\n1\n1 1 2\n9223372036854775807 -1\n").unwrap();

        let err = run(&path, 1).await.unwrap_err();
        assert!(format!("{:#}", err).contains("does not fit in i64"));
    }

    #[tokio::test]
    async fn test_overflowing_product_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "1 1\n4000000000\n2 1 2\n4000000000 0\n1 2\n").unwrap();

        let err = run(&path, 2).await.unwrap_err();
        assert!(format!("{:#}", err).contains("overflowed"));
    }

    #[tokio::test]
    async fn test_missing_input_aborts_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        let err = run(&path, 3).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Cannot open input file"));
    }

    #[tokio::test]
    async fn test_too_few_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), 2, 1);

        let err = run(&path, 3).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid process topology"));
    }

    #[tokio::test]
    async fn test_engine_failure_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), 4, 1);
        let engine = MockEngine::new();
        engine.set_should_fail(true);

        assert!(LocalCluster::new(config(&path, 2), Arc::new(engine))
            .run()
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_truncated_input_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.txt");
        // Header promises 3 targets, file holds 2
        std::fs::write(&path, "1 1\n1\n3 1 2\n1 2\n3 4\n").unwrap();

        assert!(run(&path, 2).await.is_err());
    }
}
