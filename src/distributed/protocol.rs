//! Distributed mode protocol
//!
//! This module defines the messages exchanged between the coordinator (rank 0)
//! and worker nodes (ranks `1..world_size`). The protocol uses MessagePack
//! (rmp-serde) for compact binary serialization with full serde support.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Coordinator                          Worker Node (rank r)
//!     |                                   |
//!     |-- JOIN(rank, world_size) -------->|
//!     |<------------------ READY ---------|
//!     |                                   |
//!     |-- METADATA x5 (fixed order) ----->|   broadcast stage
//!     |-- KERNEL_ROW x kernel_rows ------>|
//!     |                                   |
//!     |-- TARGET_ROW(i, row) ------------>|   distribution, every target i
//!     |          ...                      |   owned by rank r, in order
//!     |                                   |
//!     |<------------- METRIC(i, value) ---|   aggregation, local order
//!     |          ...                      |
//! ```
//!
//! Either side may send ABORT at any point; the receiver fails the run.
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// Coordinator and nodes must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted message body
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Broadcast metadata fields, in the order they are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataField {
    KernelRows,
    KernelCols,
    TargetRows,
    TargetCols,
    TargetCount,
}

impl MetadataField {
    /// Broadcast order
    pub const ORDER: [MetadataField; 5] = [
        MetadataField::KernelRows,
        MetadataField::KernelCols,
        MetadataField::TargetRows,
        MetadataField::TargetCols,
        MetadataField::TargetCount,
    ];
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataField::KernelRows => "kernel rows",
            MetadataField::KernelCols => "kernel cols",
            MetadataField::TargetRows => "target rows",
            MetadataField::TargetCols => "target cols",
            MetadataField::TargetCount => "target count",
        };
        f.write_str(name)
    }
}

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Join message (Coordinator → Node)
    ///
    /// First message on a link. Assigns the node its rank for this run.
    Join(JoinMessage),

    /// Ready message (Node → Coordinator)
    ///
    /// Reply to JOIN once the node has accepted its rank.
    Ready(ReadyMessage),

    /// One broadcast scalar (Coordinator → all Nodes)
    Metadata(MetadataMessage),

    /// One kernel row (Coordinator → all Nodes)
    KernelRow(KernelRowMessage),

    /// One row of one target (Coordinator → owning Node)
    TargetRow(TargetRowMessage),

    /// Data range of one convolved target (Node → Coordinator)
    Metric(MetricMessage),

    /// Abort message (either direction)
    ///
    /// Sent when a rank fails. The receiver fails the whole run.
    Abort(AbortMessage),
}

impl Message {
    /// Short message name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join(_) => "JOIN",
            Message::Ready(_) => "READY",
            Message::Metadata(_) => "METADATA",
            Message::KernelRow(_) => "KERNEL_ROW",
            Message::TargetRow(_) => "TARGET_ROW",
            Message::Metric(_) => "METRIC",
            Message::Abort(_) => "ABORT",
        }
    }
}

/// Join message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Rank assigned to the node
    pub rank: usize,

    /// Total number of ranks including the coordinator
    pub world_size: usize,
}

/// Ready message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyMessage {
    /// Protocol version
    pub protocol_version: u32,

    /// Node identifier (hostname)
    pub node_id: String,

    /// Rank the node accepted
    pub rank: usize,

    /// Logical CPUs available on the node
    pub num_cpus: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMessage {
    pub field: MetadataField,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelRowMessage {
    pub row: usize,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRowMessage {
    /// Global target index
    pub target: usize,
    pub row: usize,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricMessage {
    /// Global target index
    pub target: usize,
    pub value: i64,
}

/// Abort message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortMessage {
    /// Rank of the failing process
    pub rank: usize,

    /// Node identifier
    pub node_id: String,

    /// Error description
    pub error: String,
}

/// In-band protocol violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch { local: u32, remote: u32 },

    #[error("expected {expected} message from rank {rank}, got {got}")]
    UnexpectedMessage {
        rank: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("expected metadata field '{expected}', got '{got}'")]
    MetadataOrder {
        expected: MetadataField,
        got: MetadataField,
    },

    #[error("metadata field '{field}' value {value} is out of range")]
    MetadataValue { field: MetadataField, value: u64 },

    #[error("expected target {expected}, got target {got}")]
    TargetIndex { expected: usize, got: usize },

    #[error("expected row {expected}, got row {got}")]
    RowIndex { expected: usize, got: usize },

    #[error("row {row} has {got} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("rank {rank} was assigned, but rank {got} answered")]
    RankMismatch { rank: usize, got: usize },

    #[error("rank {rank} is outside a world of {world_size} ranks")]
    InvalidRank { rank: usize, world_size: usize },

    #[error("rank {rank} ({node_id}) aborted the run: {reason}")]
    Aborted {
        rank: usize,
        node_id: String,
        reason: String,
    },

    #[error("no link to rank {0}")]
    NoLink(usize),
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing. Messages larger than
/// [`MAX_MESSAGE_SIZE`] are refused here rather than by the receiver.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;

    let msg_len = frame_len(msg_bytes.len())?;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Length prefix for a body of `len` bytes
fn frame_len(len: usize) -> Result<u32> {
    if len > MAX_MESSAGE_SIZE {
        anyhow::bail!(
            "Message too large: {} bytes (max {} bytes)",
            len,
            MAX_MESSAGE_SIZE
        );
    }
    u32::try_from(len).context("Message length does not fit the length prefix")
}

/// Read a complete message from a stream
///
/// Reads the length prefix, then the message body.
pub async fn read_message<S>(stream: &mut S) -> Result<Message>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    frame_len(msg_len)?;

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a stream
///
/// Serializes the message with length prefix, writes and flushes it.
pub async fn write_message<S>(stream: &mut S, msg: &Message) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;

    stream
        .write_all(&framed)
        .await
        .context("Failed to write message")?;

    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}
