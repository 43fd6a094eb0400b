//! Local convolution stage
//!
//! Each rank convolves its own targets against the shared kernel and extracts
//! each result's data range. Work runs on a one-shot thread pool created for
//! the stage and dropped when it completes.
//!
//! # Pool sizing
//!
//! By default the pool has one worker per local target. A `threads` cap
//! bounds the pool instead, and workers then steal targets from each other
//! until all are done.
//!
//! Each worker writes only its own target slot and metric slot, so no
//! locking is needed and the result order never depends on completion order.

use crate::engine::ConvolutionEngine;
use crate::matrix::{data_range, Matrix};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::Arc;

/// Convolution stage settings for one rank
#[derive(Clone)]
pub struct LocalStage {
    engine: Arc<dyn ConvolutionEngine>,
    max_threads: Option<usize>,
}

impl LocalStage {
    pub fn new(engine: Arc<dyn ConvolutionEngine>, max_threads: Option<usize>) -> Self {
        Self { engine, max_threads }
    }

    /// Number of pool threads used for `local_count` targets
    pub fn pool_size(&self, local_count: usize) -> usize {
        let size = match self.max_threads {
            Some(cap) => local_count.min(cap),
            None => local_count,
        };
        size.max(1)
    }

    /// Convolve every target in place and return their metrics
    ///
    /// Blocks until all workers finish. `metrics[t]` belongs to `targets[t]`.
    pub fn run(&self, kernel: &Matrix, targets: &mut [Matrix]) -> Result<Vec<i64>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size(targets.len()))
            .thread_name(|i| format!("convstat-worker-{}", i))
            .build()
            .context("Failed to build worker pool")?;

        let mut metrics = vec![0i64; targets.len()];
        let engine = self.engine.as_ref();

        pool.install(|| {
            targets
                .par_iter_mut()
                .zip(metrics.par_iter_mut())
                .enumerate()
                .try_for_each(|(t, (target, metric))| -> Result<()> {
                    *target = engine
                        .convolve(kernel, target)
                        .with_context(|| format!("Convolution of local target {} failed", t))?;
                    *metric = data_range(target)
                        .with_context(|| format!("No data range for local target {}", t))?;
                    Ok(())
                })
        })?;

        Ok(metrics)
    }

    /// Run the stage on the blocking thread pool
    ///
    /// Keeps the async runtime free to service other links while workers run.
    /// Returns the convolved targets with their metrics.
    pub async fn run_blocking(&self, kernel: Arc<Matrix>, mut targets: Vec<Matrix>) -> Result<(Vec<Matrix>, Vec<i64>)> {
        let stage = self.clone();
        let local_count = targets.len();
        let started = std::time::Instant::now();

        let (targets, metrics) = tokio::task::spawn_blocking(move || {
            let metrics = stage.run(&kernel, &mut targets)?;
            Ok::<_, anyhow::Error>((targets, metrics))
        })
        .await
        .context("Worker pool panicked")??;

        tracing::debug!(
            engine = self.engine.name(),
            targets = local_count,
            threads = self.pool_size(local_count),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Local convolution stage complete"
        );
        Ok((targets, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::direct::DirectEngine;
    use crate::engine::mock::MockEngine;

    fn targets() -> Vec<Matrix> {
        vec![
            Matrix::from_rows(&[&[1, 2], &[3, 4]]),
            Matrix::from_rows(&[&[5, 5], &[5, 5]]),
            Matrix::from_rows(&[&[-3, 0], &[9, 1]]),
        ]
    }

    #[test]
    fn test_pool_size() {
        let engine: Arc<dyn ConvolutionEngine> = Arc::new(MockEngine::new());
        assert_eq!(LocalStage::new(engine.clone(), None).pool_size(7), 7);
        assert_eq!(LocalStage::new(engine.clone(), Some(3)).pool_size(7), 3);
        assert_eq!(LocalStage::new(engine.clone(), Some(16)).pool_size(7), 7);
        assert_eq!(LocalStage::new(engine, None).pool_size(0), 1);
    }

    #[test]
    fn test_metrics_follow_target_order() {
        let engine = MockEngine::new();
        let stage = LocalStage::new(Arc::new(engine.clone()), None);
        let mut targets = targets();

        let metrics = stage.run(&Matrix::from_rows(&[&[1]]), &mut targets).unwrap();
        assert_eq!(metrics, vec![3, 0, 12]);
        assert_eq!(engine.call_count(), 3);
    }

    #[test]
    fn test_targets_replaced_by_convolution() {
        let stage = LocalStage::new(Arc::new(DirectEngine::new()), Some(2));
        let kernel = Matrix::from_rows(&[&[1, 1]]);
        let mut targets = targets();

        let metrics = stage.run(&kernel, &mut targets).unwrap();
        assert_eq!(targets[0], Matrix::from_rows(&[&[3], &[7]]));
        assert_eq!(targets[2], Matrix::from_rows(&[&[-3], &[10]]));
        assert_eq!(metrics, vec![4, 0, 13]);
    }

    #[test]
    fn test_bounded_pool_matches_unbounded() {
        let kernel = Matrix::from_rows(&[&[2, -1], &[0, 1]]);
        let many: Vec<Matrix> = (0..20)
            .map(|i| Matrix::from_rows(&[&[i, i * 2, 1], &[3, -i, i % 4], &[i * i, 0, 7]]))
            .collect();

        let mut a = many.clone();
        let mut b = many;
        let unbounded = LocalStage::new(Arc::new(DirectEngine::new()), None)
            .run(&kernel, &mut a)
            .unwrap();
        let bounded = LocalStage::new(Arc::new(DirectEngine::new()), Some(3))
            .run(&kernel, &mut b)
            .unwrap();

        assert_eq!(unbounded, bounded);
        assert_eq!(a, b);
    }

    #[test]
    fn test_engine_failure_propagates() {
        let engine = MockEngine::new();
        engine.set_should_fail(true);
        let stage = LocalStage::new(Arc::new(engine), None);
        let mut targets = targets();

        assert!(stage.run(&Matrix::from_rows(&[&[1]]), &mut targets).is_err());
    }

    #[test]
    fn test_range_overflow_propagates() {
        let stage = LocalStage::new(Arc::new(MockEngine::new()), None);
        let mut targets = vec![targets().remove(0), Matrix::from_rows(&[&[i64::MAX, -1]])];

        let err = stage.run(&Matrix::from_rows(&[&[1]]), &mut targets).unwrap_err();
        assert!(format!("{:#}", err).contains("local target 1"));
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let stage = LocalStage::new(Arc::new(MockEngine::new()), None);
        let (targets, metrics) = stage
            .run_blocking(Arc::new(Matrix::from_rows(&[&[1]])), targets())
            .await
            .unwrap();

        assert_eq!(targets.len(), 3);
        assert_eq!(metrics, vec![3, 0, 12]);
    }
}
