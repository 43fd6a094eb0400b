//! Convolution engine abstraction
//!
//! A convolution engine turns a target matrix into its convolution with the
//! shared kernel. Engines are pure: the same kernel and target always produce
//! the same result, and engines hold no per-call state, so one instance is
//! shared by every worker in a process.
//!
//! # Engine Types
//!
//! - **Direct**: straightforward "valid" convolution (baseline, always available)
//! - **Mock**: identity transform with call accounting; each metric becomes
//!   the raw data range of its target
//!
//! # Example
//!
//! ```
//! use convstat::engine::{ConvolutionEngine, direct::DirectEngine};
//! use convstat::matrix::Matrix;
//!
//! let engine = DirectEngine::new();
//! let kernel = Matrix::from_rows(&[&[1, 1]]);
//! let target = Matrix::from_rows(&[&[1, 2, 3]]);
//!
//! let result = engine.convolve(&kernel, &target)?;
//! assert_eq!(result, Matrix::from_rows(&[&[3, 5]]));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod direct;
pub mod mock;

use crate::matrix::{Matrix, Shape};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Convolution engine trait for all backends
///
/// Engines must be `Send + Sync`: a single instance is shared (behind an
/// `Arc`) by all workers of the local convolution stage.
pub trait ConvolutionEngine: Send + Sync {
    /// Short engine name for logs and reports
    fn name(&self) -> &'static str;

    /// Convolve `target` with `kernel`
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel does not fit inside the target.
    fn convolve(&self, kernel: &Matrix, target: &Matrix) -> Result<Matrix>;
}

/// Available engine implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    #[default]
    Direct,
    Mock,
}

/// Create the engine selected by configuration
pub fn create_engine(engine_type: EngineType) -> Arc<dyn ConvolutionEngine> {
    match engine_type {
        EngineType::Direct => Arc::new(direct::DirectEngine::new()),
        EngineType::Mock => Arc::new(mock::MockEngine::new()),
    }
}

/// Shape of a valid convolution of a `target`-shaped matrix by a `kernel`-shaped one
///
/// Returns `None` when the kernel is larger than the target in either dimension.
pub fn output_shape(kernel: Shape, target: Shape) -> Option<Shape> {
    if kernel.is_empty() || kernel.rows > target.rows || kernel.cols > target.cols {
        return None;
    }
    Some(Shape::new(
        target.rows - kernel.rows + 1,
        target.cols - kernel.cols + 1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape() {
        assert_eq!(
            output_shape(Shape::new(2, 3), Shape::new(5, 5)),
            Some(Shape::new(4, 3))
        );
        assert_eq!(
            output_shape(Shape::new(5, 5), Shape::new(5, 5)),
            Some(Shape::new(1, 1))
        );
        assert_eq!(output_shape(Shape::new(6, 1), Shape::new(5, 5)), None);
        assert_eq!(output_shape(Shape::new(0, 1), Shape::new(5, 5)), None);
    }

    #[test]
    fn test_create_engine() {
        assert_eq!(create_engine(EngineType::Direct).name(), "direct");

        let mock = create_engine(EngineType::Mock);
        assert_eq!(mock.name(), "mock");
        let target = Matrix::from_rows(&[&[3, 1]]);
        assert_eq!(mock.convolve(&Matrix::from_rows(&[&[1, 1]]), &target).unwrap(), target);
    }

    #[test]
    fn test_engine_type_serde() {
        let parsed: EngineType = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(parsed, EngineType::Direct);
        let parsed: EngineType = serde_json::from_str("\"mock\"").unwrap();
        assert_eq!(parsed, EngineType::Mock);
    }
}
