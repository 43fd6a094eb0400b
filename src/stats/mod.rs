//! Summary statistics
//!
//! Reduces the per-target data ranges of a run into four values: minimum,
//! maximum, median and floored mean.
//!
//! # Median
//!
//! For an even number of values the median is the **lower** of the two
//! middle values. There is no interpolation, so the median is always one of
//! the observed metrics.
//!
//! # Example
//!
//! ```
//! use convstat::stats::summarize;
//!
//! let summary = summarize(vec![3, 1, 4, 1, 5, 9, 2, 6])?;
//! assert_eq!(summary.minimum, 1);
//! assert_eq!(summary.maximum, 9);
//! assert_eq!(summary.median, 3);
//! assert_eq!(summary.floored_mean, 3);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod aggregator;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Four-value summary of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub minimum: i64,
    pub maximum: i64,
    pub median: i64,
    pub floored_mean: i64,
}

/// Sort `metrics` and compute the summary
///
/// # Errors
///
/// Fails on an empty sequence.
pub fn summarize(mut metrics: Vec<i64>) -> Result<SummaryResult> {
    if metrics.is_empty() {
        anyhow::bail!("Cannot summarize an empty metric set");
    }
    metrics.sort_unstable();
    let n = metrics.len();

    let sum: i128 = metrics.iter().map(|&v| v as i128).sum();
    let floored_mean = sum.div_euclid(n as i128) as i64;

    Ok(SummaryResult {
        minimum: metrics[0],
        maximum: metrics[n - 1],
        // Middle for odd n, lower-middle for even n
        median: metrics[(n - 1) / 2],
        floored_mean,
    })
}
