//! Metadata-change listeners and the controller event loop.
//!
//! Listener callbacks arrive on metadata-store notification threads. They
//! never touch controller state directly: each callback checks the shutdown
//! flag and enqueues a [`ControllerEvent`] onto an mpsc queue. A single
//! [`ControllerEventLoop`] worker owns the partition state machine and
//! consumes the queue, so all state-machine mutations are serialized by
//! ownership rather than by a lock, and a callback can never deadlock
//! against a store acknowledgement.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::error::ControllerResult;
use super::partition_state::PartitionState;
use super::paths;
use super::state_machine::PartitionStateMachine;
use super::store::{ChildChangeListener, MetadataStore};
use crate::types::{BrokerId, TopicPartition};

/// Work items consumed by the controller event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The topics directory's child list changed.
    TopicsChanged { children: Vec<String> },

    /// A topic's partitions directory changed. Partition-count increases
    /// are not handled yet; the event exists so the subscription point is
    /// already wired.
    PartitionsChanged { topic: String },

    /// The broker-liveness tracker published a new live set.
    LiveBrokersChanged { live: Vec<BrokerId> },
}

/// Cloneable handle for producing controller events from other subsystems
/// (the liveness tracker, admin surfaces).
#[derive(Clone)]
pub struct ControllerEventSender {
    tx: mpsc::UnboundedSender<ControllerEvent>,
    shutdown: Arc<AtomicBool>,
}

impl ControllerEventSender {
    /// Enqueue an event. Returns false when the controller has shut down
    /// or the worker is gone.
    pub fn send(&self, event: ControllerEvent) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            debug!("Dropping controller event after shutdown");
            return false;
        }
        self.tx.send(event).is_ok()
    }
}

/// Child-change listener on the topics directory.
struct TopicChangeListener {
    sender: ControllerEventSender,
}

#[async_trait]
impl ChildChangeListener for TopicChangeListener {
    async fn handle_child_change(&self, _parent_path: &str, children: Vec<String>) {
        self.sender.send(ControllerEvent::TopicsChanged { children });
    }
}

/// Per-topic child-change listener on the partitions directory.
struct PartitionChangeListener {
    topic: String,
    sender: ControllerEventSender,
}

#[async_trait]
impl ChildChangeListener for PartitionChangeListener {
    async fn handle_child_change(&self, _parent_path: &str, _children: Vec<String>) {
        self.sender.send(ControllerEvent::PartitionsChanged {
            topic: self.topic.clone(),
        });
    }
}

/// Single worker that owns the partition state machine and drains the
/// controller event queue.
pub struct ControllerEventLoop<S: MetadataStore> {
    state_machine: PartitionStateMachine<S>,
    store: Arc<S>,
    tx: mpsc::UnboundedSender<ControllerEvent>,
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl<S: MetadataStore> ControllerEventLoop<S> {
    pub fn new(state_machine: PartitionStateMachine<S>, store: Arc<S>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state_machine,
            store,
            tx,
            rx,
        }
    }

    /// Handle for producing events from other subsystems.
    pub fn event_sender(&self) -> ControllerEventSender {
        ControllerEventSender {
            tx: self.tx.clone(),
            shutdown: self.state_machine.shutdown_flag(),
        }
    }

    pub fn state_machine(&self) -> &PartitionStateMachine<S> {
        &self.state_machine
    }

    pub fn state_machine_mut(&mut self) -> &mut PartitionStateMachine<S> {
        &mut self.state_machine
    }

    /// Start the state machine and register the topic-change listener.
    pub async fn startup(&mut self) -> ControllerResult<()> {
        let listener = Arc::new(TopicChangeListener {
            sender: self.event_sender(),
        });
        self.state_machine.startup(listener).await
    }

    /// Stop the state machine; queued and future events become no-ops.
    pub fn shutdown(&mut self) {
        self.state_machine.shutdown();
    }

    /// Consume events until shutdown.
    ///
    /// Infrastructural errors abort only the failing pass; the loop keeps
    /// running and the next trigger retries.
    pub async fn run(&mut self) {
        while let Some(event) = self.rx.recv().await {
            if self.state_machine.is_shut_down() {
                break;
            }
            if let Err(e) = self.process(event).await {
                error!(error = %e, "Controller event processing failed; awaiting next trigger");
            }
        }
    }

    /// Process every event already queued, for deterministic tests and
    /// embedding in external schedulers. Returns the number processed.
    pub async fn drain_pending(&mut self) -> ControllerResult<usize> {
        let mut processed = 0;
        while let Ok(event) = self.rx.try_recv() {
            if self.state_machine.is_shut_down() {
                break;
            }
            self.process(event).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Dispatch one event.
    pub async fn process(&mut self, event: ControllerEvent) -> ControllerResult<()> {
        match event {
            ControllerEvent::TopicsChanged { children } => self.handle_topic_change(children).await,
            ControllerEvent::PartitionsChanged { topic } => {
                debug!(topic = %topic, "Partition-count change observed; increases are not handled yet");
                Ok(())
            }
            ControllerEvent::LiveBrokersChanged { live } => {
                self.state_machine.context_mut().set_live_brokers(live);
                self.state_machine.trigger_online_partition_state_change().await
            }
        }
    }

    /// React to a change of the topics directory.
    ///
    /// New topics get their assignments cached and their partitions driven
    /// `NonExistent -> New -> Online`. Deleted topics only have their cache
    /// entries evicted; tearing down their state-map entries is deferred to
    /// the deletion subsystem.
    async fn handle_topic_change(&mut self, children: Vec<String>) -> ControllerResult<()> {
        if self.state_machine.is_shut_down() {
            return Ok(());
        }
        let current: HashSet<String> = children.into_iter().collect();
        let known = self.state_machine.context().all_topics.clone();

        let mut new_topics: Vec<String> = current.difference(&known).cloned().collect();
        new_topics.sort();
        let mut deleted_topics: Vec<String> = known.difference(&current).cloned().collect();
        deleted_topics.sort();

        let ctx = self.state_machine.context_mut();
        ctx.all_topics = current;
        for topic in &deleted_topics {
            ctx.evict_topic(topic);
        }

        let mut new_partitions: Vec<TopicPartition> = Vec::new();
        for topic in &new_topics {
            let path = paths::topic_path(topic);
            let Some((payload, _)) = self.store.read_data(&path).await? else {
                debug!(topic = %topic, "Topic vanished between child change and assignment read");
                continue;
            };
            let assignment = paths::decode_topic_assignment(&path, &payload)?;
            let ctx = self.state_machine.context_mut();
            for (partition, replicas) in assignment {
                let tp = TopicPartition::new(topic.clone(), partition);
                ctx.partition_replica_assignment.insert(tp.clone(), replicas);
                new_partitions.push(tp);
            }
        }
        new_partitions.sort();

        info!(
            new = ?new_topics,
            deleted = ?deleted_topics,
            "Topic change observed"
        );
        if !new_topics.is_empty() {
            self.on_new_topic_creation(&new_topics, &new_partitions).await?;
        }
        Ok(())
    }

    /// Drive each partition of the new topics to `New`, then attempt to
    /// bring them online, and register per-topic partition listeners.
    async fn on_new_topic_creation(
        &mut self,
        topics: &[String],
        partitions: &[TopicPartition],
    ) -> ControllerResult<()> {
        info!(?topics, partitions = partitions.len(), "Handling new topic creation");
        for topic in topics {
            let listener = Arc::new(PartitionChangeListener {
                topic: topic.clone(),
                sender: self.event_sender(),
            });
            self.store
                .subscribe_child_changes(&paths::topic_partitions_path(topic), listener)
                .await?;
        }
        self.state_machine
            .handle_state_changes(partitions, PartitionState::New, None)
            .await?;
        self.state_machine
            .handle_state_changes(partitions, PartitionState::Online, None)
            .await
    }
}
