//! Metadata-store path layout and node payload encoding.
//!
//! # Path Layout Specification (v1)
//!
//! The controller consumes a hierarchical namespace in the metadata store:
//!
//! - `/brokers/topics` — children are topic names
//! - `/brokers/topics/<topic>` — data is the replica-assignment map for the
//!   topic's partitions
//! - `/brokers/topics/<topic>/partitions/<partition>/state` — data is the
//!   serialized leader/ISR record for one partition
//!
//! # Payload Formats
//!
//! Payloads are UTF-8 JSON. Readers tolerate unknown fields so the format
//! can grow without a flag day.
//!
//! ## Topic assignment node
//!
//! ```json
//! {"version": 1, "partitions": {"0": [1, 2, 3], "1": [2, 3, 1]}}
//! ```
//!
//! Partition ids are decimal strings; replica lists are ordered, the head is
//! the preferred leader.
//!
//! ## Partition state node
//!
//! ```json
//! {"version": 1, "leader": 1, "leader_epoch": 0, "isr": [1, 2, 3], "controller_epoch": 5}
//! ```
//!
//! The node version used for conditional updates is store metadata, not part
//! of the payload.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::{StoreError, StoreResult};
use crate::types::{BrokerId, LeaderAndIsr, LeaderIsrAndControllerEpoch};

/// Root path whose children are topic names.
pub const BROKER_TOPICS_PATH: &str = "/brokers/topics";

/// Payload format version written by this controller.
const FORMAT_VERSION: i32 = 1;

/// Path of a topic's replica-assignment node.
pub fn topic_path(topic: &str) -> String {
    format!("{}/{}", BROKER_TOPICS_PATH, topic)
}

/// Path of the directory holding a topic's per-partition nodes.
pub fn topic_partitions_path(topic: &str) -> String {
    format!("{}/partitions", topic_path(topic))
}

/// Path of a partition's leader/ISR state node.
pub fn partition_state_path(topic: &str, partition: i32) -> String {
    format!("{}/{}/state", topic_partitions_path(topic), partition)
}

fn default_format_version() -> i32 {
    FORMAT_VERSION
}

/// Wire form of the partition state node.
#[derive(Debug, Serialize, Deserialize)]
struct PartitionStateData {
    #[serde(default = "default_format_version")]
    version: i32,
    leader: BrokerId,
    leader_epoch: i32,
    isr: Vec<BrokerId>,
    controller_epoch: i32,
}

/// Wire form of the topic assignment node.
#[derive(Debug, Serialize, Deserialize)]
struct TopicAssignmentData {
    #[serde(default = "default_format_version")]
    version: i32,
    partitions: BTreeMap<String, Vec<BrokerId>>,
}

/// Encode a leader/ISR record for the partition state node.
pub fn encode_partition_state(record: &LeaderIsrAndControllerEpoch) -> Bytes {
    let data = PartitionStateData {
        version: FORMAT_VERSION,
        leader: record.leader_and_isr.leader,
        leader_epoch: record.leader_and_isr.leader_epoch,
        isr: record.leader_and_isr.isr.clone(),
        controller_epoch: record.controller_epoch,
    };
    // Serializing a struct of plain fields cannot fail.
    Bytes::from(serde_json::to_vec(&data).unwrap_or_default())
}

/// Decode a partition state node read at `node_version`.
pub fn decode_partition_state(
    path: &str,
    payload: &[u8],
    node_version: i32,
) -> StoreResult<LeaderIsrAndControllerEpoch> {
    let data: PartitionStateData =
        serde_json::from_slice(payload).map_err(|source| StoreError::Codec {
            path: path.to_string(),
            source,
        })?;
    Ok(LeaderIsrAndControllerEpoch {
        leader_and_isr: LeaderAndIsr {
            leader: data.leader,
            leader_epoch: data.leader_epoch,
            isr: data.isr,
            node_version,
        },
        controller_epoch: data.controller_epoch,
    })
}

/// Encode a topic's replica-assignment map.
pub fn encode_topic_assignment(partitions: &BTreeMap<i32, Vec<BrokerId>>) -> Bytes {
    let data = TopicAssignmentData {
        version: FORMAT_VERSION,
        partitions: partitions
            .iter()
            .map(|(id, replicas)| (id.to_string(), replicas.clone()))
            .collect(),
    };
    Bytes::from(serde_json::to_vec(&data).unwrap_or_default())
}

/// Decode a topic's replica-assignment map.
pub fn decode_topic_assignment(
    path: &str,
    payload: &[u8],
) -> StoreResult<BTreeMap<i32, Vec<BrokerId>>> {
    let data: TopicAssignmentData =
        serde_json::from_slice(payload).map_err(|source| StoreError::Codec {
            path: path.to_string(),
            source,
        })?;
    data.partitions
        .into_iter()
        .map(|(id, replicas)| {
            let id: i32 = id.parse().map_err(|_| StoreError::Codec {
                path: path.to_string(),
                source: serde::de::Error::custom(format!("non-numeric partition id `{}`", id)),
            })?;
            Ok((id, replicas))
        })
        .collect()
}
