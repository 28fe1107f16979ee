//! # Conductor
//! Cluster-controller core for a distributed, partitioned log broker.
//!
//! This crate provides the partition lifecycle engine that runs inside the
//! single elected controller of a partitioned log cluster: it decides, for
//! every partition, whether it currently has a live leader, persists each
//! decision to a durable metadata store under controller-epoch fencing, and
//! fans the result out to the brokers hosting the affected replicas.
//!
//! # Goals
//! - Encode controller correctness under failover: a stale controller must
//!   never overwrite a fresh controller's decisions
//! - Keep the decision logic independent of any particular metadata store or
//!   broker transport; both are injected capabilities
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/) and
//!   [tracing](https://docs.rs/tracing)
//!
//! ## Getting started
//!
//! Construct a [`PartitionStateMachine`](controller::PartitionStateMachine)
//! over your metadata store and request transport, wrap it in a
//! [`ControllerEventLoop`](controller::ControllerEventLoop), and call
//! `startup()` when this process wins the controller election:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conductor::controller::{
//!     ControllerConfig, ControllerContext, ControllerEventLoop, ControllerResult,
//!     PartitionStateMachine,
//! };
//! use conductor::controller::mock_store::{InMemoryMetadataStore, RecordingRequestSender};
//! use conductor::types::BrokerId;
//!
//! #[tokio::main]
//! async fn main() -> ControllerResult<()> {
//!     let store = Arc::new(InMemoryMetadataStore::new());
//!     let sender = Arc::new(RecordingRequestSender::default());
//!     let ctx = ControllerContext::new(1, [BrokerId(1), BrokerId(2), BrokerId(3)]);
//!     let machine =
//!         PartitionStateMachine::new(store.clone(), sender, ctx, ControllerConfig::default());
//!     let mut event_loop = ControllerEventLoop::new(machine, store);
//!     event_loop.startup().await?;
//!     event_loop.run().await;
//!     Ok(())
//! }
//! ```
//!
//! Out of scope by design: the real metadata-store client, the broker-side
//! request transport, broker liveness tracking, the replica state machine,
//! and the follower fetch loop. Each is consumed through a trait defined
//! here.

#![forbid(unsafe_code)]

pub mod constants;
pub mod controller;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main exports of the controller core.
    pub use crate::controller::{
        ControllerConfig, ControllerContext, ControllerError, ControllerEvent,
        ControllerEventLoop, ControllerEventSender, ControllerResult, LeaderAndIsrRequest,
        MetadataStore, PartitionLeaderSelector, PartitionState, PartitionStateMachine,
        RequestSender,
    };
    pub use crate::types::{
        BrokerId, LeaderAndIsr, LeaderIsrAndControllerEpoch, TopicPartition,
    };
}
