//! Metric aggregation
//!
//! Collects every rank's per-target metrics on the coordinator, in global
//! target order.
//!
//! The coordinator walks target indices in increasing order. Metrics for its
//! own targets are copied from its local set; every other metric is one
//! receive from the owning rank. Worker ranks send their metrics in local
//! order, which is the order the coordinator asks for them, since both sides
//! walk the same contiguous range upward.
//!
//! # Usage
//!
//! 1. Create with `MetricAggregator::new(num_targets)`
//! 2. Record each metric with `insert()`
//! 3. Take the complete sequence with `into_metrics()`

use crate::distributed::communicator::{Communicator, COORDINATOR_RANK};
use crate::distributed::context::ProcessContext;
use crate::distributed::protocol::{Message, MetricMessage, ProtocolError};
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Global metric table, one slot per target
#[derive(Debug)]
pub struct MetricAggregator {
    slots: Vec<Option<i64>>,
    filled: usize,
}

impl MetricAggregator {
    pub fn new(num_targets: usize) -> Self {
        Self {
            slots: vec![None; num_targets],
            filled: 0,
        }
    }

    /// Record the metric for target `index`
    ///
    /// Each slot may be filled exactly once.
    pub fn insert(&mut self, index: usize, value: i64) -> Result<()> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("Target index {} out of range (0..{})", index, len))?;
        if slot.is_some() {
            anyhow::bail!("Metric for target {} recorded twice", index);
        }
        *slot = Some(value);
        self.filled += 1;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Metrics in target order
    ///
    /// # Errors
    ///
    /// Fails if any slot is still empty.
    pub fn into_metrics(self) -> Result<Vec<i64>> {
        if !self.is_complete() {
            let missing = self.slots.iter().position(Option::is_none).unwrap_or_default();
            anyhow::bail!("Missing metric for target {} of {}", missing, self.slots.len());
        }
        Ok(self.slots.into_iter().flatten().collect())
    }
}

/// Gather every metric onto the coordinator (coordinator side)
///
/// `local_metrics` are the coordinator's own metrics in local order.
/// Returns metrics for all targets in global order.
pub async fn gather_metrics<S>(
    comm: &mut Communicator<S>,
    ctx: &ProcessContext,
    local_metrics: &[i64],
) -> Result<Vec<i64>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let partition = ctx.partition;
    let mut aggregator = MetricAggregator::new(partition.num_targets());

    for index in 0..partition.num_targets() {
        let owner = partition.owner_of(index);
        if owner == ctx.rank {
            aggregator.insert(index, local_metrics[partition.local_index(index)])?;
            continue;
        }

        match comm.recv(owner).await? {
            Message::Metric(MetricMessage { target, value }) if target == index => {
                aggregator.insert(index, value)?;
            }
            Message::Metric(MetricMessage { target, .. }) => {
                return Err(ProtocolError::TargetIndex {
                    expected: index,
                    got: target,
                }
                .into());
            }
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    rank: owner,
                    expected: "METRIC",
                    got: other.kind(),
                }
                .into())
            }
        }
    }

    tracing::debug!(rank = ctx.rank, metrics = aggregator.filled, "Gathered metrics");
    aggregator.into_metrics()
}

/// Send this rank's metrics to the coordinator (worker side)
pub async fn send_metrics<S>(comm: &mut Communicator<S>, ctx: &ProcessContext, local_metrics: &[i64]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if local_metrics.len() != ctx.local_count() {
        anyhow::bail!(
            "Rank {} has {} metrics for {} local targets",
            ctx.rank,
            local_metrics.len(),
            ctx.local_count()
        );
    }

    for (target, &value) in ctx.local_range().zip(local_metrics) {
        comm.send(COORDINATOR_RANK, &Message::Metric(MetricMessage { target, value }))
            .await?;
    }

    tracing::debug!(rank = ctx.rank, metrics = local_metrics.len(), "Sent metrics");
    Ok(())
}
