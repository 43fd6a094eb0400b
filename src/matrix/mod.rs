//! Matrix value type
//!
//! A `Matrix` is a fixed-size, row-major grid of `i64`. Matrices are moved
//! between processes by value (row by row), never shared, so the type only
//! needs cheap row access and an owned constructor.

pub mod generate;
pub mod input;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by matrix arithmetic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("data range of an empty matrix is undefined")]
    Empty,

    #[error("data range {max} - {min} does not fit in i64")]
    RangeOverflow { min: i64, max: i64 },
}

/// Row/column dimensions of a matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of elements
    ///
    /// Only meaningful for shapes that passed [`Shape::checked_len`].
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Total number of elements, or `None` if it overflows `usize`
    pub fn checked_len(&self) -> Option<usize> {
        self.rows.checked_mul(self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Row-major integer matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    shape: Shape,
    data: Vec<i64>,
}

impl Matrix {
    /// Create a zero-filled matrix
    pub fn zeros(shape: Shape) -> Self {
        Self {
            shape,
            data: vec![0; shape.len()],
        }
    }

    /// Build a matrix from row-major data
    ///
    /// Returns `None` if `data.len()` does not match the shape.
    pub fn from_vec(shape: Shape, data: Vec<i64>) -> Option<Self> {
        if shape.checked_len() != Some(data.len()) {
            return None;
        }
        Some(Self { shape, data })
    }

    /// Build a matrix from nested rows (convenient in tests)
    ///
    /// # Panics
    ///
    /// Panics if the rows are ragged.
    pub fn from_rows(rows: &[&[i64]]) -> Self {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(row.len(), cols, "ragged rows");
            data.extend_from_slice(row);
        }
        Self {
            shape: Shape::new(rows.len(), cols),
            data,
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn set(&mut self, row: usize, col: usize, value: i64) {
        self.data[row * self.shape.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[i64] {
        let start = row * self.shape.cols;
        &self.data[start..start + self.shape.cols]
    }

    /// Iterate rows in order
    pub fn iter_rows(&self) -> impl Iterator<Item = &[i64]> {
        // chunks_exact(0) panics, and a zero-width matrix has no meaningful rows
        let cols = self.shape.cols.max(1);
        self.data.chunks_exact(cols).take(self.shape.rows)
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }
}

/// Data range of a matrix: maximum element minus minimum element
///
/// # Errors
///
/// Fails for an empty matrix, or when the range exceeds `i64::MAX`.
pub fn data_range(matrix: &Matrix) -> Result<i64, MatrixError> {
    let mut values = matrix.as_slice().iter().copied();
    let first = values.next().ok_or(MatrixError::Empty)?;
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    max.checked_sub(min).ok_or(MatrixError::RangeOverflow { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Matrix::from_vec(Shape::new(2, 2), vec![1, 2, 3]).is_none());
        assert!(Matrix::from_vec(Shape::new(2, 2), vec![1, 2, 3, 4]).is_some());
        assert!(Matrix::from_vec(Shape::new(usize::MAX, 2), vec![]).is_none());
    }

    #[test]
    fn test_row_access() {
        let mut m = Matrix::from_rows(&[&[1, 2, 3], &[4, 5, 6]]);
        assert_eq!(m.row(1), &[4, 5, 6]);
        m.set(0, 2, 9);
        assert_eq!(m.row(0), &[1, 2, 9]);

        let rows: Vec<&[i64]> = m.iter_rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], &[1, 2, 9]);
    }

    #[test]
    fn test_data_range() {
        let m = Matrix::from_rows(&[&[3, -2], &[10, 4]]);
        assert_eq!(data_range(&m), Ok(12));

        let single = Matrix::from_rows(&[&[5]]);
        assert_eq!(data_range(&single), Ok(0));

        assert_eq!(data_range(&Matrix::zeros(Shape::new(0, 0))), Err(MatrixError::Empty));
    }

    #[test]
    fn test_data_range_at_i64_limits() {
        let widest = Matrix::from_rows(&[&[i64::MAX, 0], &[-1, 5]]);
        assert_eq!(data_range(&widest), Ok(i64::MAX));

        let too_wide = Matrix::from_rows(&[&[i64::MAX, -1]]);
        assert_eq!(
            data_range(&too_wide),
            Err(MatrixError::RangeOverflow { min: -1, max: i64::MAX })
        );

        let extremes = Matrix::from_rows(&[&[i64::MIN], &[i64::MAX]]);
        assert!(data_range(&extremes).is_err());
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(Shape::new(3, 4).to_string(), "3x4");
        assert_eq!(Shape::new(3, 4).len(), 12);
        assert!(Shape::new(0, 4).is_empty());
    }

    #[test]
    fn test_checked_len() {
        assert_eq!(Shape::new(3, 4).checked_len(), Some(12));
        assert_eq!(Shape::new(usize::MAX, 2).checked_len(), None);
    }
}
