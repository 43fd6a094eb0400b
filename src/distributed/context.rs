//! Per-process run state
//!
//! Everything a rank needs after the broadcast stage lives in one
//! `ProcessContext` built once and passed to each later stage.

use super::partition::Partition;
use super::protocol::{MetadataField, ProtocolError};
use crate::matrix::{Matrix, Shape};
use anyhow::Result;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;

/// The five scalars broadcast before any target moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    pub kernel_shape: Shape,
    pub target_shape: Shape,
    pub num_targets: usize,
}

impl RunMetadata {
    /// Values in broadcast order
    pub fn fields(&self) -> [(MetadataField, u64); 5] {
        [
            (MetadataField::KernelRows, self.kernel_shape.rows as u64),
            (MetadataField::KernelCols, self.kernel_shape.cols as u64),
            (MetadataField::TargetRows, self.target_shape.rows as u64),
            (MetadataField::TargetCols, self.target_shape.cols as u64),
            (MetadataField::TargetCount, self.num_targets as u64),
        ]
    }

    /// Rebuild from values received in broadcast order
    pub fn from_fields(values: [u64; 5]) -> Result<Self, ProtocolError> {
        let mut dims = [0usize; 5];
        for ((slot, value), field) in dims.iter_mut().zip(values).zip(MetadataField::ORDER) {
            *slot = usize::try_from(value)
                .ok()
                .filter(|&dim| dim > 0)
                .ok_or(ProtocolError::MetadataValue { field, value })?;
        }
        let kernel_shape = Shape::new(dims[0], dims[1]);
        let target_shape = Shape::new(dims[2], dims[3]);
        for (shape, field, value) in [
            (kernel_shape, MetadataField::KernelCols, values[1]),
            (target_shape, MetadataField::TargetCols, values[3]),
        ] {
            if shape.checked_len().is_none() {
                return Err(ProtocolError::MetadataValue { field, value });
            }
        }
        Ok(Self {
            kernel_shape,
            target_shape,
            num_targets: dims[4],
        })
    }
}

/// State shared by every stage of one rank's run
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub rank: usize,
    pub world_size: usize,
    pub metadata: RunMetadata,
    pub kernel: Arc<Matrix>,
    pub partition: Partition,
}

impl ProcessContext {
    pub fn new(rank: usize, world_size: usize, metadata: RunMetadata, kernel: Matrix) -> Result<Self> {
        let partition = Partition::new(metadata.num_targets, world_size)?;
        Ok(Self {
            rank,
            world_size,
            metadata,
            kernel: Arc::new(kernel),
            partition,
        })
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == super::communicator::COORDINATOR_RANK
    }

    /// Number of targets this rank owns
    pub fn local_count(&self) -> usize {
        self.partition.local_count(self.rank)
    }

    /// Global indices this rank owns
    pub fn local_range(&self) -> Range<usize> {
        self.partition.range_of(self.rank)
    }
}
