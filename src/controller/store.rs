//! Metadata-store capabilities consumed by the controller.
//!
//! These traits abstract the durable metadata layer, allowing for:
//! - Different backend implementations (a real coordination service, an
//!   in-memory store for testing)
//! - Clear separation between the controller's decision logic and the
//!   transport that persists it
//!
//! # Store Model
//!
//! A hierarchical KV store with versioned nodes. Every node carries a
//! monotonically increasing version that the store bumps on each update;
//! [`MetadataStore::conditional_update`] only applies when the caller's
//! expected version matches, which is what makes controller elections safe
//! against concurrent writers within an epoch.
//!
//! # Watches
//!
//! [`MetadataStore::subscribe_child_changes`] registers a listener for a
//! directory. Delivery is at-least-once; listeners receive the parent path
//! and the full current child list and must tolerate redundant
//! notifications. Listener callbacks must never be invoked from a thread
//! that also services store acknowledgements, or the controller can
//! self-deadlock; implementations dispatch from a separate notification
//! task.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::StoreResult;

/// Receiver for child-change notifications on a watched directory.
#[async_trait]
pub trait ChildChangeListener: Send + Sync {
    /// Called with the parent path and its full current child list.
    async fn handle_child_change(&self, parent_path: &str, children: Vec<String>);
}

/// Conditional reads/writes and child-change subscriptions against a
/// hierarchical KV store with versioned nodes.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// List the child names of a directory node.
    ///
    /// A missing directory reads as empty.
    async fn get_children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Read a node's payload and current version; `None` when absent.
    async fn read_data(&self, path: &str) -> StoreResult<Option<(Bytes, i32)>>;

    /// Create a node. Fails with [`StoreError::NodeExists`] when a node is
    /// already present at `path`.
    ///
    /// [`StoreError::NodeExists`]: super::error::StoreError::NodeExists
    async fn create_persistent(&self, path: &str, data: Bytes) -> StoreResult<()>;

    /// Conditionally replace a node's payload.
    ///
    /// The write is applied only when the node's current version equals
    /// `expected_version`; returns `Some(new_version)` on success and `None`
    /// on a version mismatch. A missing node is an error, not a mismatch.
    async fn conditional_update(
        &self,
        path: &str,
        data: Bytes,
        expected_version: i32,
    ) -> StoreResult<Option<i32>>;

    /// Register a child-change listener on a directory.
    async fn subscribe_child_changes(
        &self,
        path: &str,
        listener: Arc<dyn ChildChangeListener>,
    ) -> StoreResult<()>;
}
