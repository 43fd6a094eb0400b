//! Target distribution
//!
//! The coordinator reads targets in global index order and hands each to its
//! owner: targets it owns are kept locally, the rest are sent row by row,
//! each row tagged with its target index and row index. Every worker knows
//! its own range from the partition and receives exactly that many targets,
//! in the same increasing order, so local order always follows global order.

use super::broadcast::{check_row, unexpected};
use super::communicator::{Communicator, COORDINATOR_RANK};
use super::context::ProcessContext;
use super::protocol::{Message, ProtocolError, TargetRowMessage};
use crate::matrix::input::InputReader;
use crate::matrix::Matrix;
use anyhow::{Context, Result};
use std::io::BufRead;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read every target and deliver it to its owner (coordinator side)
///
/// Returns the coordinator's own targets, in global order.
pub async fn distribute_targets<S, R>(
    comm: &mut Communicator<S>,
    ctx: &ProcessContext,
    input: &mut InputReader<R>,
) -> Result<Vec<Matrix>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    R: BufRead,
{
    let partition = ctx.partition;
    let mut local = Vec::new();

    for index in 0..partition.num_targets() {
        let target = input
            .next_target()
            .with_context(|| format!("Failed to read target {}", index))?;
        if target.shape() != ctx.metadata.target_shape {
            anyhow::bail!(
                "Target {} has shape {}, expected {}",
                index,
                target.shape(),
                ctx.metadata.target_shape
            );
        }

        let owner = partition.owner_of(index);
        if owner == ctx.rank {
            local.push(target);
            continue;
        }

        for (row, values) in target.iter_rows().enumerate() {
            let msg = Message::TargetRow(TargetRowMessage {
                target: index,
                row,
                values: values.to_vec(),
            });
            comm.send(owner, &msg).await?;
        }
    }

    tracing::debug!(
        rank = ctx.rank,
        sent = partition.num_targets() - local.len(),
        kept = local.len(),
        "Distributed targets"
    );
    Ok(local)
}

/// Receive this rank's targets from the coordinator (worker side)
pub async fn receive_targets<S>(comm: &mut Communicator<S>, ctx: &ProcessContext) -> Result<Vec<Matrix>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let shape = ctx.metadata.target_shape;
    let mut local = Vec::new();

    for index in ctx.local_range() {
        let mut data = Vec::new();
        for row in 0..shape.rows {
            match comm.recv(COORDINATOR_RANK).await? {
                Message::TargetRow(msg) => {
                    if msg.target != index {
                        return Err(ProtocolError::TargetIndex {
                            expected: index,
                            got: msg.target,
                        }
                        .into());
                    }
                    check_row(row, msg.row, shape.cols, msg.values.len())?;
                    data.extend_from_slice(&msg.values);
                }
                other => return Err(unexpected(ctx.rank, "TARGET_ROW", &other)),
            }
        }
        let target = Matrix::from_vec(shape, data)
            .ok_or_else(|| anyhow::anyhow!("Received target {} does not match shape {}", index, shape))?;
        local.push(target);
    }

    tracing::debug!(rank = ctx.rank, received = local.len(), "Received targets");
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::context::RunMetadata;
    use crate::distributed::protocol::write_message;
    use crate::matrix::Shape;
    use std::io::Cursor;

    /// Input text with `n` 2x2 targets; target i is filled with i
    fn input_text(n: usize) -> String {
        let mut text = format!("1 1\n1\n{} 2 2\n", n);
        for i in 0..n {
            text.push_str(&format!("{i} {i}\n{i} {i}\n"));
        }
        text
    }

    fn context(rank: usize, world_size: usize, n: usize) -> ProcessContext {
        let metadata = RunMetadata {
            kernel_shape: Shape::new(1, 1),
            target_shape: Shape::new(2, 2),
            num_targets: n,
        };
        ProcessContext::new(rank, world_size, metadata, Matrix::from_rows(&[&[1]])).unwrap()
    }

    fn filled(value: i64) -> Matrix {
        Matrix::from_rows(&[&[value, value], &[value, value]])
    }

    #[tokio::test]
    async fn test_targets_reach_their_owners_in_order() {
        let (n, world_size) = (10, 3);

        let mut links = Vec::new();
        let mut handles = Vec::new();
        for rank in 1..world_size {
            let (a, b) = tokio::io::duplex(256);
            links.push(a);
            handles.push(tokio::spawn(async move {
                let ctx = context(rank, world_size, n);
                let mut comm = Communicator::worker(rank, world_size, "node".to_string(), b);
                receive_targets(&mut comm, &ctx).await
            }));
        }

        let mut root = Communicator::coordinator("root".to_string(), links);
        let ctx = context(0, world_size, n);
        let mut input = InputReader::new(Cursor::new(input_text(n)));
        input.read_header().unwrap();

        let local = distribute_targets(&mut root, &ctx, &mut input).await.unwrap();
        assert_eq!(local, (0..3).map(filled).collect::<Vec<_>>());

        let rank1 = handles.remove(0).await.unwrap().unwrap();
        assert_eq!(rank1, (3..6).map(filled).collect::<Vec<_>>());

        // Last rank holds the remainder
        let rank2 = handles.remove(0).await.unwrap().unwrap();
        assert_eq!(rank2, (6..10).map(filled).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_single_process_keeps_everything() {
        let n = 4;
        let mut root = Communicator::<tokio::io::DuplexStream>::coordinator("root".to_string(), vec![]);
        let ctx = context(0, 1, n);
        let mut input = InputReader::new(Cursor::new(input_text(n)));
        input.read_header().unwrap();

        let local = distribute_targets(&mut root, &ctx, &mut input).await.unwrap();
        assert_eq!(local.len(), 4);
        assert_eq!(local[3], filled(3));
    }

    #[tokio::test]
    async fn test_wrong_target_tag_rejected() {
        let (mut a, b) = tokio::io::duplex(1024);
        // Rank 1 of 2 with 4 targets owns 2..4, so target 1 is wrong
        let msg = Message::TargetRow(TargetRowMessage {
            target: 1,
            row: 0,
            values: vec![0, 0],
        });
        write_message(&mut a, &msg).await.unwrap();

        let ctx = context(1, 2, 4);
        let mut comm = Communicator::worker(1, 2, "node".to_string(), b);
        let err = receive_targets(&mut comm, &ctx).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProtocolError>(),
            Some(&ProtocolError::TargetIndex { expected: 2, got: 1 })
        );
    }

    #[tokio::test]
    async fn test_short_input_fails() {
        let mut root = Communicator::<tokio::io::DuplexStream>::coordinator("root".to_string(), vec![]);
        let ctx = context(0, 1, 4);
        // Header promises 4 targets, text holds 2
        let text = input_text(4).lines().take(7).collect::<Vec<_>>().join("\n");
        let mut input = InputReader::new(Cursor::new(text));
        input.read_header().unwrap();

        assert!(distribute_targets(&mut root, &ctx, &mut input).await.is_err());
    }
}
