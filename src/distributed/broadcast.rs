//! Broadcast stage
//!
//! Establishes the same kernel and run metadata on every rank. The
//! coordinator broadcasts the five metadata scalars in a fixed order, then the
//! kernel one row at a time. Worker ranks allocate their kernel only after
//! learning its shape.
//!
//! Every rank must enter this stage; a rank that never does leaves the others
//! waiting.

use super::communicator::Communicator;
use super::context::RunMetadata;
use super::protocol::{KernelRowMessage, Message, MetadataField, MetadataMessage, ProtocolError};
use crate::matrix::Matrix;
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Run the broadcast stage
///
/// The coordinator passes `Some((metadata, kernel))`; every other rank passes
/// `None`. All ranks return the same metadata and an identical kernel.
pub async fn broadcast_setup<S>(
    comm: &mut Communicator<S>,
    source: Option<(RunMetadata, Matrix)>,
) -> Result<(RunMetadata, Matrix)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match source {
        Some((metadata, kernel)) if comm.is_coordinator() => {
            send_setup(comm, &metadata, &kernel).await?;
            Ok((metadata, kernel))
        }
        Some(_) => anyhow::bail!("Only the coordinator may supply broadcast data"),
        None if comm.is_coordinator() => {
            anyhow::bail!("Coordinator must supply kernel and metadata")
        }
        None => receive_setup(comm).await,
    }
}

async fn send_setup<S>(comm: &mut Communicator<S>, metadata: &RunMetadata, kernel: &Matrix) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    debug_assert_eq!(kernel.shape(), metadata.kernel_shape);

    for (field, value) in metadata.fields() {
        comm.broadcast(Some(Message::Metadata(MetadataMessage { field, value })))
            .await?;
    }

    for (row, values) in kernel.iter_rows().enumerate() {
        comm.broadcast(Some(Message::KernelRow(KernelRowMessage {
            row,
            values: values.to_vec(),
        })))
        .await?;
    }

    tracing::debug!(
        rank = comm.rank(),
        kernel = %metadata.kernel_shape,
        targets = metadata.num_targets,
        "Broadcast kernel and metadata"
    );
    Ok(())
}

async fn receive_setup<S>(comm: &mut Communicator<S>) -> Result<(RunMetadata, Matrix)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut values = [0u64; 5];
    for (slot, expected) in values.iter_mut().zip(MetadataField::ORDER) {
        match comm.broadcast(None).await? {
            Message::Metadata(meta) if meta.field == expected => *slot = meta.value,
            Message::Metadata(meta) => {
                return Err(ProtocolError::MetadataOrder {
                    expected,
                    got: meta.field,
                }
                .into())
            }
            other => return Err(unexpected(comm.rank(), "METADATA", &other)),
        }
    }
    let metadata = RunMetadata::from_fields(values)?;

    // Grows as rows arrive rather than trusting the announced shape up front
    let mut data = Vec::new();
    for row in 0..metadata.kernel_shape.rows {
        match comm.broadcast(None).await? {
            Message::KernelRow(msg) => {
                check_row(row, msg.row, metadata.kernel_shape.cols, msg.values.len())?;
                data.extend_from_slice(&msg.values);
            }
            other => return Err(unexpected(comm.rank(), "KERNEL_ROW", &other)),
        }
    }
    let kernel = Matrix::from_vec(metadata.kernel_shape, data)
        .ok_or_else(|| anyhow::anyhow!("Received kernel does not match shape {}", metadata.kernel_shape))?;

    tracing::debug!(
        rank = comm.rank(),
        kernel = %metadata.kernel_shape,
        targets = metadata.num_targets,
        "Received kernel and metadata"
    );
    Ok((metadata, kernel))
}

/// Validate a received row's index and width
pub(crate) fn check_row(expected_row: usize, row: usize, expected_cols: usize, cols: usize) -> Result<()> {
    if row != expected_row {
        return Err(ProtocolError::RowIndex {
            expected: expected_row,
            got: row,
        }
        .into());
    }
    if cols != expected_cols {
        return Err(ProtocolError::RowWidth {
            row,
            expected: expected_cols,
            got: cols,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn unexpected(rank: usize, expected: &'static str, got: &Message) -> anyhow::Error {
    ProtocolError::UnexpectedMessage {
        rank,
        expected,
        got: got.kind(),
    }
    .into()
}
