//! Configuration validation

use super::*;
use crate::config::cli::ExecutionMode;
use crate::distributed::partition::Partition;
use crate::engine::output_shape;
use crate::matrix::input::InputHeader;
use anyhow::{Context, Result};

/// Validate complete configuration for `mode`
pub fn validate_config(config: &Config, mode: ExecutionMode) -> Result<()> {
    validate_workers(&config.workers)?;
    validate_cluster(&config.cluster, mode)?;

    match mode {
        ExecutionMode::Standalone | ExecutionMode::Coordinator => {
            if config.input.is_none() {
                anyhow::bail!("An input file is required in {:?} mode", mode);
            }
        }
        ExecutionMode::Generate => {
            if config.input.is_none() {
                anyhow::bail!("Generate mode requires an output path");
            }
            config
                .generate
                .clone()
                .unwrap_or_default()
                .validate()
                .context("Invalid generate settings")?;
        }
        ExecutionMode::Service => {}
    }

    Ok(())
}

/// Validate worker configuration
pub fn validate_workers(workers: &WorkerConfig) -> Result<()> {
    if workers.threads == Some(0) {
        anyhow::bail!("threads must be at least 1");
    }
    Ok(())
}

/// Validate topology configuration
pub fn validate_cluster(cluster: &ClusterConfig, mode: ExecutionMode) -> Result<()> {
    match mode {
        ExecutionMode::Standalone => {
            if cluster.processes == 0 {
                anyhow::bail!("processes must be at least 1");
            }
        }
        ExecutionMode::Coordinator => {
            if cluster.nodes.is_empty() {
                anyhow::bail!("Coordinator mode requires --host-list, --clients-file, or cluster.nodes");
            }
            let mut seen = std::collections::HashSet::new();
            for node in &cluster.nodes {
                if !seen.insert(node) {
                    anyhow::bail!("Node {} is listed more than once", node);
                }
            }
        }
        ExecutionMode::Service | ExecutionMode::Generate => {}
    }
    Ok(())
}

/// Check an input header against the topology before any data moves
///
/// Returns the partition the run will use.
pub fn validate_input(header: &InputHeader, world_size: usize) -> Result<Partition> {
    if output_shape(header.kernel.shape(), header.target_shape).is_none() {
        anyhow::bail!(
            "Kernel {} does not fit inside targets of shape {}",
            header.kernel.shape(),
            header.target_shape
        );
    }

    let partition = Partition::new(header.num_targets, world_size)
        .context("Invalid process topology for this input")?;
    Ok(partition)
}
