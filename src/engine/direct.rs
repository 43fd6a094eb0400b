//! Direct convolution engine
//!
//! Computes a "valid" convolution: the kernel slides over every position
//! where it fits entirely inside the target, and each output element is the
//! sum of element-wise products at that position. The kernel is not flipped.

use super::{output_shape, ConvolutionEngine};
use crate::matrix::Matrix;
use crate::Result;

/// Straightforward nested-loop convolution
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectEngine;

impl DirectEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ConvolutionEngine for DirectEngine {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn convolve(&self, kernel: &Matrix, target: &Matrix) -> Result<Matrix> {
        let shape = output_shape(kernel.shape(), target.shape()).ok_or_else(|| {
            anyhow::anyhow!(
                "Kernel {} does not fit inside target {}",
                kernel.shape(),
                target.shape()
            )
        })?;

        let mut out = Matrix::zeros(shape);
        for i in 0..shape.rows {
            for j in 0..shape.cols {
                let mut acc = 0i64;
                for (a, kernel_row) in kernel.iter_rows().enumerate() {
                    let target_row = &target.row(i + a)[j..j + kernel_row.len()];
                    for (k, t) in kernel_row.iter().zip(target_row) {
                        acc = k
                            .checked_mul(*t)
                            .and_then(|product| acc.checked_add(product))
                            .ok_or_else(|| overflow(i, j))?;
                    }
                }
                out.set(i, j, acc);
            }
        }
        Ok(out)
    }
}

fn overflow(i: usize, j: usize) -> anyhow::Error {
    anyhow::anyhow!("Convolution overflowed i64 at output element ({}, {})", i, j)
}
