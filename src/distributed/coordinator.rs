//! Distributed coordinator
//!
//! This module implements rank 0. The coordinator:
//! - Connects to all nodes and assigns their ranks
//! - Reads the input and checks it against the topology
//! - Broadcasts the kernel and metadata
//! - Distributes targets to their owners
//! - Convolves its own targets
//! - Gathers every metric and computes the summary
//!
//! Any failure is reported to every node with an ABORT before the
//! coordinator returns the error, so no rank is left waiting.

use super::broadcast::broadcast_setup;
use super::communicator::Communicator;
use super::context::{ProcessContext, RunMetadata};
use super::distribution::distribute_targets;
use super::protocol::*;
use crate::config::validator::validate_input;
use crate::config::Config;
use crate::engine::ConvolutionEngine;
use crate::matrix::input::InputReader;
use crate::stats::aggregator::gather_metrics;
use crate::stats::{summarize, SummaryResult};
use crate::worker::LocalStage;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: SummaryResult,
    pub metadata: RunMetadata,
    pub world_size: usize,
    /// Targets convolved by each rank, indexed by rank
    pub local_counts: Vec<usize>,
    pub engine: &'static str,
}

/// Distributed coordinator
///
/// Orchestrates one run across the coordinator and its nodes.
pub struct DistributedCoordinator {
    config: Arc<Config>,
    engine: Arc<dyn ConvolutionEngine>,
    node_id: String,
}

impl DistributedCoordinator {
    /// Create a new distributed coordinator
    pub fn new(config: Arc<Config>, engine: Arc<dyn ConvolutionEngine>) -> Self {
        Self {
            config,
            engine,
            node_id: "coordinator".to_string(),
        }
    }

    /// Connect to every node over TCP and assign ranks in address order
    pub async fn connect(&self, node_addresses: &[String]) -> Result<Communicator<TcpStream>> {
        let mut links = Vec::with_capacity(node_addresses.len());
        for (i, addr) in node_addresses.iter().enumerate() {
            tracing::info!(rank = i + 1, %addr, "Connecting to node");
            let stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;
            stream.set_nodelay(true).ok();
            links.push(stream);
        }
        self.handshake(links).await
    }

    /// Assign ranks over already-open links; `links[i]` becomes rank `i + 1`
    pub async fn handshake<S>(&self, mut links: Vec<S>) -> Result<Communicator<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let world_size = links.len() + 1;

        for (i, link) in links.iter_mut().enumerate() {
            let rank = i + 1;
            let join = Message::Join(JoinMessage {
                protocol_version: PROTOCOL_VERSION,
                rank,
                world_size,
            });
            write_message(link, &join)
                .await
                .with_context(|| format!("Failed to send JOIN to rank {}", rank))?;

            match read_message(link)
                .await
                .with_context(|| format!("Failed to read READY from rank {}", rank))?
            {
                Message::Ready(ready) => {
                    if ready.protocol_version != PROTOCOL_VERSION {
                        return Err(ProtocolError::VersionMismatch {
                            local: PROTOCOL_VERSION,
                            remote: ready.protocol_version,
                        }
                        .into());
                    }
                    if ready.rank != rank {
                        return Err(ProtocolError::RankMismatch { rank, got: ready.rank }.into());
                    }
                    tracing::info!(
                        rank,
                        node = %ready.node_id,
                        cpus = ready.num_cpus,
                        "Node ready"
                    );
                }
                Message::Abort(abort) => {
                    return Err(ProtocolError::Aborted {
                        rank,
                        node_id: abort.node_id,
                        reason: abort.error,
                    }
                    .into());
                }
                other => {
                    return Err(ProtocolError::UnexpectedMessage {
                        rank,
                        expected: "READY",
                        got: other.kind(),
                    }
                    .into());
                }
            }
        }

        Ok(Communicator::coordinator(self.node_id.clone(), links))
    }

    /// Run the pipeline as rank 0
    ///
    /// On failure every node is sent an ABORT before the error is returned.
    pub async fn run<S>(&self, mut comm: Communicator<S>) -> Result<RunReport>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.execute(&mut comm).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!(rank = comm.rank(), "Run failed: {:#}", e);
                comm.abort(&format!("{:#}", e)).await;
                Err(e)
            }
        }
    }

    async fn execute<S>(&self, comm: &mut Communicator<S>) -> Result<RunReport>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let world_size = comm.world_size();
        let path = self
            .config
            .input
            .as_ref()
            .context("No input file configured")?;

        let mut input = InputReader::open(path)
            .with_context(|| format!("Cannot open input file: {}", path.display()))?;
        let header = input
            .read_header()
            .with_context(|| format!("Failed to read input header: {}", path.display()))?;
        let partition = validate_input(&header, world_size)?;

        tracing::info!(
            kernel = %header.kernel.shape(),
            target = %header.target_shape,
            targets = header.num_targets,
            world_size,
            chunk_size = partition.chunk_size(),
            "Starting run"
        );

        let metadata = RunMetadata {
            kernel_shape: header.kernel.shape(),
            target_shape: header.target_shape,
            num_targets: header.num_targets,
        };
        let (metadata, kernel) = broadcast_setup(comm, Some((metadata, header.kernel))).await?;
        let ctx = ProcessContext::new(comm.rank(), world_size, metadata, kernel)?;

        let targets = distribute_targets(comm, &ctx, &mut input).await?;

        let stage = LocalStage::new(self.engine.clone(), self.config.workers.threads);
        let (_, local_metrics) = stage.run_blocking(ctx.kernel.clone(), targets).await?;

        let metrics = gather_metrics(comm, &ctx, &local_metrics).await?;
        let summary = summarize(metrics)?;

        tracing::info!(
            minimum = summary.minimum,
            maximum = summary.maximum,
            median = summary.median,
            floored_mean = summary.floored_mean,
            "Run complete"
        );

        Ok(RunReport {
            summary,
            metadata,
            world_size,
            local_counts: (0..world_size).map(|r| partition.local_count(r)).collect(),
            engine: self.engine.name(),
        })
    }
}
