//! Target partitioning across processes
//!
//! Targets are split into contiguous chunks of `num_targets / num_processes`
//! indices. Every process except the last owns exactly one chunk; the last
//! process additionally takes the remainder, so it may hold up to
//! `num_processes - 1` extra targets.
//!
//! ```text
//! num_targets = 10, num_processes = 3, chunk_size = 3
//!
//! index:  0 1 2 | 3 4 5 | 6 7 8 9
//! owner:  0 0 0 | 1 1 1 | 2 2 2 2
//! ```
//!
//! Index 9 divides to owner 3, which does not exist; it is clamped to the last
//! process.

use std::ops::Range;
use thiserror::Error;

/// Partition precondition violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("at least one process is required")]
    NoProcesses,

    #[error("{num_targets} targets cannot be split across {num_processes} processes (need at least one target per process)")]
    TooFewTargets {
        num_targets: usize,
        num_processes: usize,
    },
}

/// Ownership map for `num_targets` targets over `num_processes` processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    num_targets: usize,
    num_processes: usize,
    chunk_size: usize,
}

impl Partition {
    /// Build a partition
    ///
    /// # Errors
    ///
    /// Fails if `num_processes == 0` or `num_targets < num_processes`.
    pub fn new(num_targets: usize, num_processes: usize) -> Result<Self, PartitionError> {
        if num_processes == 0 {
            return Err(PartitionError::NoProcesses);
        }
        if num_targets < num_processes {
            return Err(PartitionError::TooFewTargets {
                num_targets,
                num_processes,
            });
        }
        Ok(Self {
            num_targets,
            num_processes,
            chunk_size: num_targets / num_processes,
        })
    }

    pub fn num_targets(&self) -> usize {
        self.num_targets
    }

    pub fn num_processes(&self) -> usize {
        self.num_processes
    }

    /// Targets per process, excluding the last process's remainder
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of targets owned by `rank`
    pub fn local_count(&self, rank: usize) -> usize {
        debug_assert!(rank < self.num_processes);
        if rank == self.num_processes - 1 {
            self.num_targets - (self.num_processes - 1) * self.chunk_size
        } else {
            self.chunk_size
        }
    }

    /// Rank that owns target `index`
    pub fn owner_of(&self, index: usize) -> usize {
        debug_assert!(index < self.num_targets);
        (index / self.chunk_size).min(self.num_processes - 1)
    }

    /// Global target indices owned by `rank`, in increasing order
    pub fn range_of(&self, rank: usize) -> Range<usize> {
        let start = rank * self.chunk_size;
        start..start + self.local_count(rank)
    }

    /// Position of target `index` within its owner's local set
    pub fn local_index(&self, index: usize) -> usize {
        index - self.range_of(self.owner_of(index)).start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uneven_partition() {
        let p = Partition::new(10, 3).unwrap();
        assert_eq!(p.chunk_size(), 3);

        let counts: Vec<usize> = (0..3).map(|r| p.local_count(r)).collect();
        assert_eq!(counts, vec![3, 3, 4]);

        // 9 / 3 == 3 must clamp to the last rank
        assert_eq!(p.owner_of(9), 2);
        assert_eq!(p.owner_of(8), 2);
        assert_eq!(p.owner_of(5), 1);
        assert_eq!(p.range_of(2), 6..10);
        assert_eq!(p.local_index(9), 3);
    }

    #[test]
    fn test_even_partition() {
        let p = Partition::new(12, 4).unwrap();
        for rank in 0..4 {
            assert_eq!(p.local_count(rank), 3);
            assert_eq!(p.range_of(rank), rank * 3..rank * 3 + 3);
        }
    }

    #[test]
    fn test_single_process_owns_everything() {
        let p = Partition::new(7, 1).unwrap();
        assert_eq!(p.local_count(0), 7);
        assert!((0..7).all(|i| p.owner_of(i) == 0));
    }

    #[test]
    fn test_large_remainder() {
        // chunk_size 1: the last rank takes 1 + 4 remainder targets
        let p = Partition::new(9, 5).unwrap();
        assert_eq!(p.chunk_size(), 1);
        assert_eq!(p.local_count(4), 5);
        assert_eq!(p.owner_of(8), 4);
    }

    #[test]
    fn test_coverage_and_ownership() {
        for num_processes in 1..=8 {
            for num_targets in num_processes..=40 {
                let p = Partition::new(num_targets, num_processes).unwrap();

                let total: usize = (0..num_processes).map(|r| p.local_count(r)).sum();
                assert_eq!(total, num_targets);

                // Owners step through every rank in order, never skipping
                let mut prev = 0;
                let mut seen = vec![0usize; num_processes];
                for i in 0..num_targets {
                    let owner = p.owner_of(i);
                    assert!(owner < num_processes);
                    assert!(owner == prev || owner == prev + 1);
                    assert!(p.range_of(owner).contains(&i));
                    seen[owner] += 1;
                    prev = owner;
                }
                for rank in 0..num_processes {
                    assert_eq!(seen[rank], p.local_count(rank));
                }
            }
        }
    }

    #[test]
    fn test_preconditions() {
        assert_eq!(Partition::new(5, 0), Err(PartitionError::NoProcesses));
        assert_eq!(
            Partition::new(2, 3),
            Err(PartitionError::TooFewTargets {
                num_targets: 2,
                num_processes: 3
            })
        );
    }
}
