//! Cluster-controller core: the partition lifecycle engine.
//!
//! The elected controller decides, for every partition in the cluster,
//! whether it currently has a live leader, persists that decision to the
//! metadata store under controller-epoch fencing, and tells the affected
//! brokers.
//!
//! # Architecture
//!
//! ```text
//!   topic child-change      broker membership       direct calls
//!          │                       │              (reassignment,
//!          ▼                       ▼               failure handler)
//!   ┌──────────────┐        ┌─────────────┐              │
//!   │ TopicChange  │        │ Event       │              │
//!   │ Listener     │──────▶ │ Queue       │ ◀────────────┘
//!   └──────────────┘        └──────┬──────┘
//!                                  ▼
//!                     ┌─────────────────────────┐
//!                     │ ControllerEventLoop     │  single worker,
//!                     │  └ PartitionStateMachine│  owns all state
//!                     │     └ ControllerContext │
//!                     └──────┬───────────┬──────┘
//!                            │           │
//!                 durable CAS│           │batched fan-out
//!                            ▼           ▼
//!                   ┌──────────────┐  ┌───────────────┐
//!                   │ MetadataStore│  │ RequestSender │
//!                   │ (versioned   │  │ (one request  │
//!                   │  KV + watch) │  │  per broker)  │
//!                   └──────────────┘  └───────────────┘
//! ```
//!
//! # Correctness Under Failover
//!
//! - **Epoch fencing**: every durable write carries the controller epoch;
//!   every election read aborts when it observes a higher stored epoch.
//! - **Optimistic concurrency**: leader/ISR updates are conditional on the
//!   node version observed at read time and retry on mismatch.
//! - **Single-writer state**: the event loop owns the state machine; no
//!   lock, no interleaved passes.
//! - **Deferred fan-out**: broker notifications accumulate in a batch and
//!   are sent only after every durable write of the pass succeeded.

mod config;
mod context;
mod error;
pub mod leader_selector;
mod listeners;
pub mod metrics;
mod partition_state;
pub mod paths;
mod request_batch;
mod state_machine;
mod store;

#[cfg(any(test, feature = "test-utilities"))]
pub mod mock_store;

pub use config::ControllerConfig;
pub use context::ControllerContext;
pub use error::{ControllerError, ControllerResult, StoreError, StoreResult};
pub use leader_selector::{
    ControlledShutdownLeaderSelector, LeaderSelection, OfflinePartitionLeaderSelector,
    PartitionLeaderSelector, PreferredReplicaPartitionLeaderSelector,
    ReassignedPartitionLeaderSelector,
};
pub use listeners::{ControllerEvent, ControllerEventLoop, ControllerEventSender};
pub use partition_state::PartitionState;
pub use request_batch::{
    ControllerBrokerRequestBatch, LeaderAndIsrRequest, PartitionStateEntry, RequestSender,
};
pub use state_machine::PartitionStateMachine;
pub use store::{ChildChangeListener, MetadataStore};
