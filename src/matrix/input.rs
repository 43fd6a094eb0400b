//! Text input reader
//!
//! Input is a stream of whitespace-separated integers:
//!
//! ```text
//! <kernel rows> <kernel cols>
//! <kernel values, row-major>
//! <target count> <target rows> <target cols>
//! <target 0 values, row-major>
//! <target 1 values, row-major>
//! ...
//! ```
//!
//! The header (kernel and target metadata) is read eagerly. Targets are read
//! one at a time so the coordinator can forward each to its owner without
//! holding the whole collection in memory.

use super::{Matrix, Shape};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading input
#[derive(Debug, Error)]
pub enum InputError {
    #[error("I/O error while reading input: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of input while reading {what}")]
    UnexpectedEof { what: &'static str },

    #[error("invalid integer {token:?} while reading {what}")]
    InvalidToken { token: String, what: &'static str },

    #[error("{what} must be a positive integer, got {value}")]
    InvalidDimension { value: i64, what: &'static str },

    #[error("{what} {shape} holds more elements than fit in memory")]
    ShapeTooLarge { shape: Shape, what: &'static str },

    #[error("all {0} targets have already been read")]
    Exhausted(usize),
}

/// Kernel and target metadata from the start of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputHeader {
    pub kernel: Matrix,
    pub num_targets: usize,
    pub target_shape: Shape,
}

/// Streaming reader over the input format
pub struct InputReader<R> {
    reader: R,
    line: String,
    tokens: Vec<String>,
    target_shape: Option<Shape>,
    num_targets: usize,
    targets_read: usize,
}

impl InputReader<BufReader<File>> {
    /// Open an input file
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> InputReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            tokens: Vec::new(),
            target_shape: None,
            num_targets: 0,
            targets_read: 0,
        }
    }

    /// Read the kernel and target metadata
    pub fn read_header(&mut self) -> Result<InputHeader, InputError> {
        let kernel_rows = self.next_dimension("kernel row count")?;
        let kernel_cols = self.next_dimension("kernel column count")?;
        let kernel_shape = checked_shape(kernel_rows, kernel_cols, "kernel")?;
        let kernel = self.read_matrix(kernel_shape, "kernel values")?;

        let num_targets = self.next_dimension("target count")?;
        let target_rows = self.next_dimension("target row count")?;
        let target_cols = self.next_dimension("target column count")?;
        let target_shape = checked_shape(target_rows, target_cols, "target")?;

        self.target_shape = Some(target_shape);
        self.num_targets = num_targets;
        self.targets_read = 0;

        Ok(InputHeader {
            kernel,
            num_targets,
            target_shape,
        })
    }

    /// Read the next target matrix
    pub fn next_target(&mut self) -> Result<Matrix, InputError> {
        let shape = self
            .target_shape
            .ok_or(InputError::UnexpectedEof { what: "input header" })?;
        if self.targets_read >= self.num_targets {
            return Err(InputError::Exhausted(self.num_targets));
        }
        let matrix = self.read_matrix(shape, "target values")?;
        self.targets_read += 1;
        Ok(matrix)
    }

    /// Shapes passed here have been through [`checked_shape`]
    fn read_matrix(&mut self, shape: Shape, what: &'static str) -> Result<Matrix, InputError> {
        // Grows with the values actually present, not the declared size
        let mut data = Vec::new();
        for _ in 0..shape.len() {
            data.push(self.next_int(what)?);
        }
        Matrix::from_vec(shape, data).ok_or(InputError::ShapeTooLarge { shape, what })
    }

    fn next_dimension(&mut self, what: &'static str) -> Result<usize, InputError> {
        let value = self.next_int(what)?;
        if value <= 0 {
            return Err(InputError::InvalidDimension { value, what });
        }
        usize::try_from(value).map_err(|_| InputError::InvalidDimension { value, what })
    }

    fn next_int(&mut self, what: &'static str) -> Result<i64, InputError> {
        let token = self.next_token(what)?;
        token
            .parse::<i64>()
            .map_err(|_| InputError::InvalidToken { token, what })
    }

    fn next_token(&mut self, what: &'static str) -> Result<String, InputError> {
        while self.tokens.is_empty() {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Err(InputError::UnexpectedEof { what });
            }
            // Reversed so pop() yields tokens in order
            self.tokens = self
                .line
                .split_whitespace()
                .rev()
                .map(str::to_string)
                .collect();
        }
        // Loop above guarantees a token
        Ok(self.tokens.pop().unwrap_or_default())
    }
}

fn checked_shape(rows: usize, cols: usize, what: &'static str) -> Result<Shape, InputError> {
    let shape = Shape::new(rows, cols);
    match shape.checked_len() {
        Some(_) => Ok(shape),
        None => Err(InputError::ShapeTooLarge { shape, what }),
    }
}
