//! In-memory metadata store and request sender for testing.
//!
//! Full-featured in-memory implementations of the controller's collaborator
//! capabilities, for comprehensive testing without external dependencies.
//!
//! # Usage
//!
//! This module is available when the `test-utilities` feature is enabled,
//! or during unit tests:
//!
//! ```toml
//! [dev-dependencies]
//! conductor = { path = ".", features = ["test-utilities"] }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::error::{ControllerError, ControllerResult, StoreError, StoreResult};
use super::request_batch::{LeaderAndIsrRequest, RequestSender};
use super::store::{ChildChangeListener, MetadataStore};
use crate::types::BrokerId;

/// Hierarchical in-memory store with versioned nodes and child watches.
///
/// Versions start at 0 on create and bump by one on every successful
/// conditional update, matching the contract the controller relies on.
/// Child-change listeners fire inline from the mutating call, after the
/// mutation is visible.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    nodes: RwLock<BTreeMap<String, (Bytes, i32)>>,
    watchers: RwLock<HashMap<String, Vec<Arc<dyn ChildChangeListener>>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn parent_of(path: &str) -> Option<&str> {
        path.rsplit_once('/').map(|(parent, _)| parent)
    }

    fn child_of<'a>(parent: &str, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(parent)?.strip_prefix('/')?;
        let child = rest.split('/').next()?;
        (!child.is_empty()).then_some(child)
    }

    async fn children_of(&self, parent: &str) -> Vec<String> {
        let nodes = self.nodes.read().await;
        let mut children: Vec<String> = nodes
            .keys()
            .filter_map(|path| Self::child_of(parent, path))
            .map(str::to_string)
            .collect();
        children.dedup();
        children
    }

    async fn notify_child_change(&self, parent: &str) {
        let listeners: Vec<Arc<dyn ChildChangeListener>> = {
            let watchers = self.watchers.read().await;
            watchers.get(parent).cloned().unwrap_or_default()
        };
        if listeners.is_empty() {
            return;
        }
        let children = self.children_of(parent).await;
        for listener in listeners {
            listener
                .handle_child_change(parent, children.clone())
                .await;
        }
    }

    /// Current version of a node; test assertion helper.
    pub async fn node_version(&self, path: &str) -> Option<i32> {
        self.nodes.read().await.get(path).map(|(_, v)| *v)
    }

    /// Remove a node and everything below it, firing the parent watch.
    ///
    /// The controller never deletes; this stands in for the deletion
    /// subsystem when tests need a topic to disappear.
    pub async fn delete_recursive(&self, path: &str) {
        {
            let mut nodes = self.nodes.write().await;
            let prefix = format!("{}/", path);
            nodes.retain(|p, _| p != path && !p.starts_with(&prefix));
        }
        if let Some(parent) = Self::parent_of(path) {
            self.notify_child_change(parent).await;
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_children(&self, path: &str) -> StoreResult<Vec<String>> {
        Ok(self.children_of(path).await)
    }

    async fn read_data(&self, path: &str) -> StoreResult<Option<(Bytes, i32)>> {
        Ok(self.nodes.read().await.get(path).cloned())
    }

    async fn create_persistent(&self, path: &str, data: Bytes) -> StoreResult<()> {
        {
            let mut nodes = self.nodes.write().await;
            if nodes.contains_key(path) {
                return Err(StoreError::NodeExists(path.to_string()));
            }
            nodes.insert(path.to_string(), (data, 0));
        }
        if let Some(parent) = Self::parent_of(path) {
            self.notify_child_change(parent).await;
        }
        Ok(())
    }

    async fn conditional_update(
        &self,
        path: &str,
        data: Bytes,
        expected_version: i32,
    ) -> StoreResult<Option<i32>> {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(path) {
            None => Err(StoreError::NoNode(path.to_string())),
            Some((_, version)) if *version != expected_version => Ok(None),
            Some((payload, version)) => {
                *payload = data;
                *version += 1;
                Ok(Some(*version))
            }
        }
    }

    async fn subscribe_child_changes(
        &self,
        path: &str,
        listener: Arc<dyn ChildChangeListener>,
    ) -> StoreResult<()> {
        self.watchers
            .write()
            .await
            .entry(path.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }
}

/// Records every outgoing request for later assertions.
#[derive(Default)]
pub struct RecordingRequestSender {
    requests: StdMutex<Vec<(BrokerId, LeaderAndIsrRequest)>>,
    fail: AtomicBool,
}

impl RecordingRequestSender {
    /// A sender whose every send fails, for flush error paths.
    pub fn failing() -> Self {
        let sender = Self::default();
        sender.fail.store(true, Ordering::SeqCst);
        sender
    }

    /// All requests dispatched to `broker`, in send order.
    pub fn requests_for(&self, broker: BrokerId) -> Vec<LeaderAndIsrRequest> {
        self.requests
            .lock()
            .expect("sender mutex poisoned")
            .iter()
            .filter(|(b, _)| *b == broker)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Every (broker, request) pair dispatched so far.
    pub fn all_requests(&self) -> Vec<(BrokerId, LeaderAndIsrRequest)> {
        self.requests.lock().expect("sender mutex poisoned").clone()
    }

    /// Total number of requests dispatched.
    pub fn total_requests(&self) -> usize {
        self.requests.lock().expect("sender mutex poisoned").len()
    }

    /// Forget everything sent so far.
    pub fn clear(&self) {
        self.requests.lock().expect("sender mutex poisoned").clear();
    }
}

impl RequestSender for RecordingRequestSender {
    fn send_request(
        &self,
        broker: BrokerId,
        request: LeaderAndIsrRequest,
    ) -> ControllerResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControllerError::Batch(format!(
                "injected send failure to broker {}",
                broker
            )));
        }
        self.requests
            .lock()
            .expect("sender mutex poisoned")
            .push((broker, request));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_read() {
        let store = InMemoryMetadataStore::new();
        store
            .create_persistent("/a/b", Bytes::from_static(b"x"))
            .await
            .unwrap();
        let (data, version) = store.read_data("/a/b").await.unwrap().unwrap();
        assert_eq!(&data[..], b"x");
        assert_eq!(version, 0);
    }

    #[tokio::test]
    async fn test_create_twice_is_node_exists() {
        let store = InMemoryMetadataStore::new();
        store
            .create_persistent("/a", Bytes::new())
            .await
            .unwrap();
        let err = store.create_persistent("/a", Bytes::new()).await.unwrap_err();
        assert!(err.is_node_exists());
    }

    #[tokio::test]
    async fn test_conditional_update_version_protocol() {
        let store = InMemoryMetadataStore::new();
        store
            .create_persistent("/a", Bytes::from_static(b"v0"))
            .await
            .unwrap();

        // Mismatched expectation is a rejection, not an error.
        assert_eq!(
            store
                .conditional_update("/a", Bytes::from_static(b"v1"), 7)
                .await
                .unwrap(),
            None
        );
        // Matching expectation bumps the version.
        assert_eq!(
            store
                .conditional_update("/a", Bytes::from_static(b"v1"), 0)
                .await
                .unwrap(),
            Some(1)
        );
        assert_eq!(store.node_version("/a").await, Some(1));
    }

    #[tokio::test]
    async fn test_conditional_update_missing_node() {
        let store = InMemoryMetadataStore::new();
        assert!(store
            .conditional_update("/missing", Bytes::new(), 0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_children_are_direct_only() {
        let store = InMemoryMetadataStore::new();
        store
            .create_persistent("/t/a", Bytes::new())
            .await
            .unwrap();
        store
            .create_persistent("/t/a/deep", Bytes::new())
            .await
            .unwrap();
        store
            .create_persistent("/t/b", Bytes::new())
            .await
            .unwrap();
        assert_eq!(store.get_children("/t").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_recording_sender_filters_by_broker() {
        let sender = RecordingRequestSender::default();
        let request = LeaderAndIsrRequest {
            controller_epoch: 1,
            partitions: vec![],
        };
        sender.send_request(BrokerId(1), request.clone()).unwrap();
        sender.send_request(BrokerId(2), request).unwrap();
        assert_eq!(sender.requests_for(BrokerId(1)).len(), 1);
        assert_eq!(sender.total_requests(), 2);
    }
}
