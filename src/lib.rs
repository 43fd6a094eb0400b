//! convstat - distributed convolution with data-range statistics
//!
//! convstat convolves many target matrices against one kernel, reduces each
//! result to its data range (maximum minus minimum), and summarizes all of
//! them as minimum, maximum, median and floored mean.
//!
//! # Architecture
//!
//! - **Two-level parallelism**: targets are split across ranks in contiguous
//!   chunks, then each rank convolves its chunk on a local thread pool
//! - **Star topology**: the coordinator (rank 0) reads the input, broadcasts
//!   the kernel, distributes targets and gathers one metric per target
//! - **Pluggable transport**: ranks talk over TCP between hosts or over
//!   in-memory links inside one process, through the same code path
//! - **Deterministic results**: the summary depends only on the input, never
//!   on the number of ranks or threads

pub mod config;
pub mod distributed;
pub mod engine;
pub mod matrix;
pub mod output;
pub mod stats;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use engine::ConvolutionEngine;
pub use matrix::{Matrix, Shape};
pub use stats::SummaryResult;

/// Result type used throughout convstat
pub type Result<T> = anyhow::Result<T>;
