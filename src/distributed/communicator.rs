//! Point-to-point and collective messaging between ranks
//!
//! The topology is a star: the coordinator (rank 0) holds one link per worker
//! rank, and every worker holds a single link back to the coordinator. All
//! messages in the run travel between the coordinator and one worker, so the
//! star is enough for both point-to-point traffic and rank-0 broadcasts.
//!
//! Links are any duplex byte stream: `TcpStream` between hosts, or
//! `tokio::io::DuplexStream` when every rank runs inside one process.
//!
//! Messages on a link arrive in the order they were sent. Every `recv`
//! blocks until the matching `send` happens; there is no timeout.

use super::protocol::{read_message, write_message, AbortMessage, Message, ProtocolError};
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// Rank of the coordinator
pub const COORDINATOR_RANK: usize = 0;

/// Messaging endpoint for one rank
pub struct Communicator<S> {
    rank: usize,
    world_size: usize,
    node_id: String,
    /// Indexed by peer rank; `None` or missing where there is no direct link
    links: Vec<Option<S>>,
}

impl<S> Communicator<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Coordinator endpoint; `links[i]` connects to rank `i + 1`
    pub fn coordinator(node_id: String, links: Vec<S>) -> Self {
        let world_size = links.len() + 1;
        let mut slots = Vec::with_capacity(world_size);
        slots.push(None);
        slots.extend(links.into_iter().map(Some));

        Self {
            rank: COORDINATOR_RANK,
            world_size,
            node_id,
            links: slots,
        }
    }

    /// Worker endpoint with its single link to the coordinator
    ///
    /// Only the coordinator slot is stored, whatever `world_size` claims.
    pub fn worker(rank: usize, world_size: usize, node_id: String, link: S) -> Self {
        Self {
            rank,
            world_size,
            node_id,
            links: vec![Some(link)],
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR_RANK
    }

    /// Send a message to `dest`
    pub async fn send(&mut self, dest: usize, msg: &Message) -> Result<()> {
        let link = self.link(dest)?;
        write_message(link, msg)
            .await
            .with_context(|| format!("Failed to send {} to rank {}", msg.kind(), dest))
    }

    /// Receive the next message from `source`
    ///
    /// An ABORT from the peer is turned into a [`ProtocolError::Aborted`] error.
    pub async fn recv(&mut self, source: usize) -> Result<Message> {
        let link = self.link(source)?;
        let msg = read_message(link)
            .await
            .with_context(|| format!("Failed to receive from rank {}", source))?;

        if let Message::Abort(abort) = msg {
            return Err(ProtocolError::Aborted {
                rank: abort.rank,
                node_id: abort.node_id,
                reason: abort.error,
            }
            .into());
        }
        Ok(msg)
    }

    /// Broadcast from the coordinator to every rank
    ///
    /// The coordinator passes `Some(msg)` and gets it back; every other rank
    /// passes `None` and receives the coordinator's message.
    pub async fn broadcast(&mut self, msg: Option<Message>) -> Result<Message> {
        if self.is_coordinator() {
            let msg = msg.context("Coordinator must supply the broadcast message")?;
            for dest in 1..self.world_size {
                self.send(dest, &msg).await?;
            }
            Ok(msg)
        } else {
            self.recv(COORDINATOR_RANK).await
        }
    }

    /// Tell every linked rank that this run has failed
    ///
    /// Best effort: peers that already hung up are skipped.
    pub async fn abort(&mut self, reason: &str) {
        let msg = Message::Abort(AbortMessage {
            rank: self.rank,
            node_id: self.node_id.clone(),
            error: reason.to_string(),
        });
        for (peer, slot) in self.links.iter_mut().enumerate() {
            if let Some(link) = slot.as_mut() {
                if let Err(e) = write_message(link, &msg).await {
                    tracing::debug!(rank = self.rank, peer, "Failed to deliver abort: {:#}", e);
                }
            }
        }
    }

    fn link(&mut self, peer: usize) -> Result<&mut S> {
        self.links
            .get_mut(peer)
            .and_then(Option::as_mut)
            .ok_or_else(|| ProtocolError::NoLink(peer).into())
    }
}
