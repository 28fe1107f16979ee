//! Batched leader-and-ISR notification fan-out to brokers.
//!
//! During a transition pass every affected partition contributes one entry
//! per target broker; a single flush at the end of the pass sends one
//! aggregated request per broker. Coalescing bounds the controller-to-broker
//! message count at O(brokers) per pass instead of O(partitions), and it
//! guarantees that notifications only go out after every durable write of
//! the pass has succeeded.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::error::{ControllerError, ControllerResult};
use super::metrics;
use crate::types::{BrokerId, LeaderIsrAndControllerEpoch, TopicPartition};

/// One partition's worth of leadership state inside a broker request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStateEntry {
    pub partition: TopicPartition,
    pub leadership: LeaderIsrAndControllerEpoch,
    /// Full assigned replica set of the partition.
    pub replicas: Vec<BrokerId>,
}

/// Aggregated notification sent to one broker, tagged with the epoch of the
/// controller that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderAndIsrRequest {
    pub controller_epoch: i32,
    pub partitions: Vec<PartitionStateEntry>,
}

/// Outgoing transport for controller-to-broker requests.
///
/// Delivery is fire-and-forget from the controller's point of view; an
/// implementation typically enqueues onto a per-broker channel. An error
/// from `send_request` fails the batch flush.
pub trait RequestSender: Send + Sync {
    fn send_request(&self, broker: BrokerId, request: LeaderAndIsrRequest)
        -> ControllerResult<()>;
}

/// Accumulates per-broker leader-and-ISR entries during one transition pass.
pub struct ControllerBrokerRequestBatch {
    sender: Arc<dyn RequestSender>,
    pending: BTreeMap<BrokerId, BTreeMap<TopicPartition, PartitionStateEntry>>,
    open: bool,
}

impl ControllerBrokerRequestBatch {
    pub fn new(sender: Arc<dyn RequestSender>) -> Self {
        Self {
            sender,
            pending: BTreeMap::new(),
            open: false,
        }
    }

    /// Open a fresh batch. Fails if the previous batch was never flushed,
    /// which would silently drop or reorder notifications.
    pub fn new_batch(&mut self) -> ControllerResult<()> {
        if self.open {
            return Err(ControllerError::Batch(
                "cannot open a new request batch while one is in flight".to_string(),
            ));
        }
        self.pending.clear();
        self.open = true;
        Ok(())
    }

    /// Whether a batch is currently open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Discard the current batch without sending.
    ///
    /// Used when a pass aborts on an infrastructural error before its flush;
    /// partial notifications must not leak into the next pass.
    pub fn abort(&mut self) {
        self.pending.clear();
        self.open = false;
    }

    /// Queue one partition's leadership record for each broker in
    /// `broker_ids`. A later add for the same (broker, partition) replaces
    /// the earlier entry.
    pub fn add_leader_and_isr_request_for_brokers(
        &mut self,
        broker_ids: &[BrokerId],
        partition: &TopicPartition,
        leadership: &LeaderIsrAndControllerEpoch,
        replicas: &[BrokerId],
    ) -> ControllerResult<()> {
        if !self.open {
            return Err(ControllerError::Batch(
                "no open request batch to add to".to_string(),
            ));
        }
        for &broker in broker_ids {
            self.pending.entry(broker).or_default().insert(
                partition.clone(),
                PartitionStateEntry {
                    partition: partition.clone(),
                    leadership: leadership.clone(),
                    replicas: replicas.to_vec(),
                },
            );
        }
        Ok(())
    }

    /// Flush the batch: one aggregated request per broker with pending
    /// entries. Brokers not in `live_brokers` are skipped silently. The
    /// batch is closed whether or not delivery succeeds.
    pub fn send_requests_to_brokers(
        &mut self,
        controller_epoch: i32,
        live_brokers: &HashSet<BrokerId>,
    ) -> ControllerResult<()> {
        if !self.open {
            return Err(ControllerError::Batch(
                "no open request batch to flush".to_string(),
            ));
        }
        self.open = false;
        let pending = std::mem::take(&mut self.pending);

        for (broker, entries) in pending {
            if !live_brokers.contains(&broker) {
                debug!(broker = %broker, entries = entries.len(), "Skipping leader-and-ISR request to non-live broker");
                continue;
            }
            let request = LeaderAndIsrRequest {
                controller_epoch,
                partitions: entries.into_values().collect(),
            };
            let partition_count = request.partitions.len();
            let broker_label = broker.to_string();
            metrics::LEADER_AND_ISR_REQUESTS
                .with_label_values(&[broker_label.as_str()])
                .inc();
            metrics::LEADER_AND_ISR_REQUEST_PARTITIONS
                .with_label_values(&[broker_label.as_str()])
                .inc_by(partition_count as u64);
            info!(
                broker = %broker,
                controller_epoch,
                partitions = partition_count,
                "Sending leader-and-ISR request"
            );
            self.sender
                .send_request(broker, request)
                .map_err(|e| ControllerError::Batch(format!("flush to broker {}: {}", broker, e)))?;
        }
        Ok(())
    }
}
