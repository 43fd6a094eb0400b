//! Node service for distributed mode
//!
//! This module implements the service that runs on each node. The service:
//! - Listens for connections from the coordinator
//! - Accepts its rank from the JOIN message
//! - Receives the kernel, metadata and its own targets
//! - Convolves its targets on a local worker pool
//! - Sends its metrics back to the coordinator
//!
//! One connection carries one run. After the run completes (or fails) the
//! service goes back to waiting for the next coordinator.

use crate::distributed::broadcast::broadcast_setup;
use crate::distributed::communicator::{Communicator, COORDINATOR_RANK};
use crate::distributed::context::ProcessContext;
use crate::distributed::distribution::receive_targets;
use crate::distributed::protocol::*;
use crate::engine::ConvolutionEngine;
use crate::stats::aggregator::send_metrics;
use crate::worker::LocalStage;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

/// What a node did during one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRunStats {
    pub rank: usize,
    pub world_size: usize,
    pub local_targets: usize,
}

/// Node service
///
/// Runs on each node in distributed mode, accepting runs from a coordinator.
#[derive(Clone)]
pub struct NodeService {
    /// Port to listen on
    listen_port: u16,

    /// Node identifier (hostname)
    node_id: String,

    engine: Arc<dyn ConvolutionEngine>,

    /// Worker pool cap; `None` means one thread per local target
    threads: Option<usize>,
}

impl NodeService {
    /// Create a new node service
    pub fn new(listen_port: u16, engine: Arc<dyn ConvolutionEngine>, threads: Option<usize>) -> Result<Self> {
        let node_id = get_node_id()?;

        Ok(Self {
            listen_port,
            node_id,
            engine,
            threads,
        })
    }

    /// Replace the node identifier reported to the coordinator
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Run the node service
    ///
    /// Listens for coordinator connections and serves one run per connection.
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind node service on {}", addr))?;

        tracing::info!(port = self.listen_port, node = %self.node_id, "Node service listening");

        loop {
            let (stream, addr) = listener.accept().await.context("Failed to accept connection")?;
            stream.set_nodelay(true).ok();
            tracing::info!(%addr, "Coordinator connected");

            // Runs are served one at a time
            match self.handle_run(stream).await {
                Ok(stats) => tracing::info!(
                    rank = stats.rank,
                    world_size = stats.world_size,
                    targets = stats.local_targets,
                    "Run complete"
                ),
                Err(e) => tracing::error!("Run failed: {:#}", e),
            }

            tracing::info!("Waiting for next connection");
        }
    }

    /// Serve a single run over `stream`
    pub async fn handle_run<S>(&self, mut stream: S) -> Result<NodeRunStats>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let join = match read_message(&mut stream)
            .await
            .context("Failed to read JOIN message")?
        {
            Message::Join(join) => join,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    rank: COORDINATOR_RANK,
                    expected: "JOIN",
                    got: other.kind(),
                }
                .into())
            }
        };

        if let Err(e) = check_join(&join) {
            self.reject(&mut stream, join.rank, &e).await;
            return Err(e.into());
        }

        let ready = Message::Ready(ReadyMessage {
            protocol_version: PROTOCOL_VERSION,
            node_id: self.node_id.clone(),
            rank: join.rank,
            num_cpus: num_cpus::get(),
        });
        write_message(&mut stream, &ready)
            .await
            .context("Failed to send READY message")?;

        tracing::debug!(rank = join.rank, world_size = join.world_size, "Joined run");

        let mut comm = Communicator::worker(join.rank, join.world_size, self.node_id.clone(), stream);
        match self.execute(&mut comm).await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                // A peer abort needs no echo
                if !matches!(e.downcast_ref::<ProtocolError>(), Some(ProtocolError::Aborted { .. })) {
                    comm.abort(&format!("{:#}", e)).await;
                }
                Err(e)
            }
        }
    }

    async fn execute<S>(&self, comm: &mut Communicator<S>) -> Result<NodeRunStats>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (metadata, kernel) = broadcast_setup(comm, None).await?;
        let ctx = ProcessContext::new(comm.rank(), comm.world_size(), metadata, kernel)?;

        let targets = receive_targets(comm, &ctx).await?;

        let stage = LocalStage::new(self.engine.clone(), self.threads);
        let (_, local_metrics) = stage.run_blocking(ctx.kernel.clone(), targets).await?;

        send_metrics(comm, &ctx, &local_metrics).await?;

        Ok(NodeRunStats {
            rank: ctx.rank,
            world_size: ctx.world_size,
            local_targets: local_metrics.len(),
        })
    }

    /// Report a rejected JOIN before dropping the connection
    async fn reject<S>(&self, stream: &mut S, rank: usize, error: &ProtocolError)
    where
        S: AsyncWrite + Unpin,
    {
        let abort = Message::Abort(AbortMessage {
            rank,
            node_id: self.node_id.clone(),
            error: error.to_string(),
        });
        if let Err(e) = write_message(stream, &abort).await {
            tracing::debug!("Failed to report rejected JOIN: {:#}", e);
        }
    }
}

fn check_join(join: &JoinMessage) -> Result<(), ProtocolError> {
    if join.protocol_version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            local: PROTOCOL_VERSION,
            remote: join.protocol_version,
        });
    }
    if join.rank == COORDINATOR_RANK || join.rank >= join.world_size {
        return Err(ProtocolError::InvalidRank {
            rank: join.rank,
            world_size: join.world_size,
        });
    }
    Ok(())
}

/// Get node identifier (hostname)
fn get_node_id() -> Result<String> {
    if let Ok(hostname) = hostname::get() {
        if let Ok(hostname_str) = hostname.into_string() {
            return Ok(hostname_str);
        }
    }

    Ok("unknown".to_string())
}
