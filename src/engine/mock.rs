//! Mock convolution engine for testing
//!
//! The mock engine returns the target unchanged, so the metric of each
//! "convolved" target is simply the data range of the input. It records how
//! many times it was called and can be told to fail, which lets tests check
//! the worker pool and error propagation without depending on convolution
//! arithmetic.
//!
//! # Example
//!
//! ```
//! use convstat::engine::{ConvolutionEngine, mock::MockEngine};
//! use convstat::matrix::Matrix;
//!
//! let engine = MockEngine::new();
//! let target = Matrix::from_rows(&[&[1, 9]]);
//! let result = engine.convolve(&Matrix::from_rows(&[&[1]]), &target).unwrap();
//!
//! assert_eq!(result, target);
//! assert_eq!(engine.call_count(), 1);
//! ```

use super::ConvolutionEngine;
use crate::matrix::Matrix;
use crate::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Identity engine with call accounting
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    calls: Arc<AtomicUsize>,
    should_fail: Arc<AtomicBool>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `convolve` calls so far (including failed ones)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConvolutionEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn convolve(&self, _kernel: &Matrix, target: &Matrix) -> Result<Matrix> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            anyhow::bail!("Mock convolution failure");
        }
        Ok(target.clone())
    }
}
