//! Error types for the controller core.
//!
//! # Error Handling Patterns
//!
//! This crate uses two containment levels based on what failed:
//!
//! ## Per-Partition (Contain and Continue)
//!
//! A transition that fails for one partition must not abort the pass for the
//! others. `handle_state_changes` logs these and moves on:
//! - Illegal state transitions (programming errors on a single partition)
//! - Failed elections (no live replica, stale node, epoch fencing)
//!
//! ## Infrastructural (Abort the Pass)
//!
//! Failures of the machinery under every partition abort the current pass and
//! propagate to the caller, who retries on the next trigger:
//! - Metadata-store transport failures
//! - Request batch misuse or flush failure
//!
//! # Fencing
//!
//! [`ControllerError::StateChangeFailed`] produced by the election path when
//! a higher controller epoch is observed means this controller has been
//! superseded. The state machine stops advancing that partition; the new
//! controller re-drives it.

use thiserror::Error;

use crate::types::TopicPartition;

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Result type for metadata-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the metadata-store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A create targeted a path that already holds a node.
    #[error("node already exists at {0}")]
    NodeExists(String),

    /// A read or update targeted a path with no node.
    #[error("no node at {0}")]
    NoNode(String),

    /// Transport failure (network I/O or session loss) talking to the store.
    #[error("metadata store transport error: {0}")]
    Transport(String),

    /// A node payload failed to decode.
    #[error("malformed node payload at {path}: {source}")]
    Codec {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// True when the error is the node-exists create conflict.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, StoreError::NodeExists(_))
    }
}

/// Errors raised while driving partition state transitions.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Target state is not reachable from the partition's current state.
    ///
    /// This is a programming error in the caller; the partition is skipped
    /// and the rest of the batch continues.
    #[error("partition {partition} cannot move from {from} to {to}; legal sources: {legal}")]
    IllegalStateTransition {
        partition: TopicPartition,
        from: &'static str,
        to: &'static str,
        legal: &'static str,
    },

    /// A transition was attempted and could not complete; the partition
    /// stays in its current state.
    #[error("state change failed for partition {partition}: {reason}")]
    StateChangeFailed {
        partition: TopicPartition,
        reason: String,
    },

    /// A leader selector found no eligible live replica.
    #[error("no replica online for partition {partition}: live brokers {live:?}, candidates {candidates:?}")]
    NoReplicaOnline {
        partition: TopicPartition,
        live: Vec<i32>,
        candidates: Vec<i32>,
    },

    /// Election could not produce a leader; every candidate is dead.
    ///
    /// Raised by the election path when a selector reports
    /// [`ControllerError::NoReplicaOnline`]; the caller decides whether to
    /// mark the partition offline.
    #[error("partition {partition} is offline: {reason}")]
    PartitionOffline {
        partition: TopicPartition,
        reason: String,
    },

    /// Transport failure talking to the metadata store.
    #[error("metadata store error: {0}")]
    MetadataStore(#[from] StoreError),

    /// The broker request batch was misused or its flush failed.
    #[error("broker request batch error: {0}")]
    Batch(String),
}

impl ControllerError {
    /// State-change failure with a formatted reason.
    pub fn state_change_failed(partition: &TopicPartition, reason: impl Into<String>) -> Self {
        ControllerError::StateChangeFailed {
            partition: partition.clone(),
            reason: reason.into(),
        }
    }

    /// True when this error aborts the whole pass rather than one partition.
    pub fn is_infrastructural(&self) -> bool {
        matches!(
            self,
            ControllerError::MetadataStore(_) | ControllerError::Batch(_)
        )
    }
}
