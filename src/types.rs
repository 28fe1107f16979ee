//! Type-safe wrappers and records for controller primitives.
//!
//! These newtypes provide type safety to prevent mixing up different
//! integer types that have the same underlying representation but
//! different semantic meanings, plus the leadership records the controller
//! caches and writes to the metadata store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A broker identifier.
///
/// Broker IDs are 32-bit signed integers that uniquely identify
/// brokers within a cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BrokerId(pub i32);

impl BrokerId {
    /// Invalid broker ID, typically used to indicate no leader.
    pub const INVALID: Self = BrokerId(-1);

    /// Create a new broker ID from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        BrokerId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) broker ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for BrokerId {
    fn from(value: i32) -> Self {
        BrokerId(value)
    }
}

impl From<BrokerId> for i32 {
    fn from(id: BrokerId) -> Self {
        id.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A topic/partition pair, the unit the controller drives.
///
/// Value-compared; usable directly as a map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    /// Create a new topic/partition pair.
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        TopicPartition {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Leader and in-sync-replica set for one partition.
///
/// Invariants: `leader` is a member of `isr`; `isr` is a subset of the
/// partition's assigned replicas. `node_version` mirrors the metadata-store
/// node version observed at the last read or write and drives the
/// conditional-update protocol during elections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderAndIsr {
    /// The replica currently accepting writes.
    pub leader: BrokerId,
    /// Leadership generation, incremented on every election.
    pub leader_epoch: i32,
    /// In-sync replicas, in priority order.
    pub isr: Vec<BrokerId>,
    /// Metadata-store node version observed at last read/write.
    pub node_version: i32,
}

impl LeaderAndIsr {
    /// Initial leadership record for a partition that has never had a
    /// durable leader/ISR node.
    pub fn initial(leader: BrokerId, isr: Vec<BrokerId>) -> Self {
        LeaderAndIsr {
            leader,
            leader_epoch: crate::constants::INITIAL_LEADER_EPOCH,
            isr,
            node_version: crate::constants::INITIAL_NODE_VERSION,
        }
    }

    /// Successor record with a new leader and ISR and a bumped leader epoch.
    ///
    /// `node_version` is carried over unchanged; the conditional write that
    /// persists the successor replaces it with the store's new version.
    pub fn next_generation(&self, leader: BrokerId, isr: Vec<BrokerId>) -> Self {
        LeaderAndIsr {
            leader,
            leader_epoch: self.leader_epoch + 1,
            isr,
            node_version: self.node_version,
        }
    }
}

impl fmt::Display for LeaderAndIsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(leader={}, epoch={}, isr={:?}, version={})",
            self.leader,
            self.leader_epoch,
            self.isr.iter().map(|b| b.value()).collect::<Vec<_>>(),
            self.node_version
        )
    }
}

/// A leadership record tagged with the controller generation that wrote it.
///
/// The controller epoch is the fence: a controller must never overwrite a
/// record carrying an epoch higher than its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderIsrAndControllerEpoch {
    pub leader_and_isr: LeaderAndIsr,
    pub controller_epoch: i32,
}

impl fmt::Display for LeaderIsrAndControllerEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ controller epoch {}",
            self.leader_and_isr, self.controller_epoch
        )
    }
}
