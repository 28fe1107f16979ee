//! The partition lifecycle engine.
//!
//! `PartitionStateMachine` owns the `TopicPartition -> PartitionState` map
//! and every transition into and out of it. It reads cluster state from the
//! [`ControllerContext`], performs durable writes through the
//! [`MetadataStore`] with the controller epoch as a fence, and queues broker
//! notifications into a [`ControllerBrokerRequestBatch`] that is flushed
//! once per pass.
//!
//! # Serialization
//!
//! The state machine is owned by a single controller worker; `&mut self` on
//! every entry point is what guarantees that no two passes interleave.
//! Listener callbacks never touch this type directly - they enqueue events
//! for the worker (see [`super::listeners`]).
//!
//! # Failure containment
//!
//! A transition that fails for one partition is logged and skipped; the
//! rest of the pass continues. Infrastructural failures (metadata-store
//! transport, batch flush) abort the pass and surface to the caller, who
//! retries on the next trigger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::ControllerConfig;
use super::context::ControllerContext;
use super::error::{ControllerError, ControllerResult, StoreError};
use super::leader_selector::{OfflinePartitionLeaderSelector, PartitionLeaderSelector};
use super::metrics;
use super::partition_state::PartitionState;
use super::paths;
use super::request_batch::{ControllerBrokerRequestBatch, RequestSender};
use super::store::{ChildChangeListener, MetadataStore};
use crate::types::{BrokerId, LeaderAndIsr, LeaderIsrAndControllerEpoch, TopicPartition};

/// Election outcome labels for the `leader_elections_total` metric.
const OUTCOME_SUCCESS: &str = "success";
const OUTCOME_FAILED: &str = "failed";
const OUTCOME_FENCED: &str = "fenced";

/// Drives every partition of the cluster through its lifecycle.
pub struct PartitionStateMachine<S: MetadataStore> {
    store: Arc<S>,
    ctx: ControllerContext,
    config: ControllerConfig,
    partition_state: HashMap<TopicPartition, PartitionState>,
    request_batch: ControllerBrokerRequestBatch,
    shutdown: Arc<AtomicBool>,
}

impl<S: MetadataStore> PartitionStateMachine<S> {
    pub fn new(
        store: Arc<S>,
        sender: Arc<dyn RequestSender>,
        ctx: ControllerContext,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            ctx,
            config,
            partition_state: HashMap::new(),
            request_batch: ControllerBrokerRequestBatch::new(sender),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bring a newly elected controller's partition machinery up.
    ///
    /// Clears the shutdown flag, reconstructs partition state from durable
    /// metadata, attempts to bring every `New`/`Offline` partition online,
    /// and registers `topic_listener` on the topics directory. Idempotent;
    /// requires single-threaded entry (hold exclusive ownership).
    pub async fn startup(
        &mut self,
        topic_listener: Arc<dyn ChildChangeListener>,
    ) -> ControllerResult<()> {
        info!(controller_epoch = self.ctx.epoch, "Partition state machine starting up");
        self.shutdown.store(false, Ordering::SeqCst);
        self.initialize_partition_state().await?;
        self.trigger_online_partition_state_change().await?;
        self.store
            .subscribe_child_changes(paths::BROKER_TOPICS_PATH, topic_listener)
            .await?;
        Ok(())
    }

    /// Stop driving transitions and drop all partition state.
    ///
    /// Listener callbacks observe the flag and no-op from here on.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for (_, state) in self.partition_state.drain() {
            if state != PartitionState::NonExistent {
                metrics::PARTITIONS_BY_STATE
                    .with_label_values(&[state.state_name()])
                    .dec();
            }
        }
        info!("Partition state machine shut down");
    }

    /// Shared shutdown flag, cloned into listener callbacks.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// The controller's metadata cache.
    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    /// Mutable access for the collaborators that feed the cache (broker
    /// liveness tracker, reassignment subsystem).
    pub fn context_mut(&mut self) -> &mut ControllerContext {
        &mut self.ctx
    }

    /// Current lifecycle state of a partition; unknown partitions read as
    /// `NonExistent`.
    pub fn state_of(&self, partition: &TopicPartition) -> PartitionState {
        self.partition_state
            .get(partition)
            .copied()
            .unwrap_or_default()
    }

    /// All partitions currently in `state`, sorted for determinism.
    pub fn partitions_in_state(&self, state: PartitionState) -> Vec<TopicPartition> {
        let mut partitions: Vec<TopicPartition> = self
            .partition_state
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(tp, _)| tp.clone())
            .collect();
        partitions.sort();
        partitions
    }

    /// Bulk transition driver: one batch pass over `partitions` toward
    /// `target`.
    ///
    /// `selector` applies to `Online` targets only; `None` means the
    /// built-in offline selector. Per-partition failures are logged and do
    /// not abort the loop; metadata-store and flush failures do.
    pub async fn handle_state_changes(
        &mut self,
        partitions: &[TopicPartition],
        target: PartitionState,
        selector: Option<&dyn PartitionLeaderSelector>,
    ) -> ControllerResult<()> {
        if self.is_shut_down() {
            warn!(?target, "Ignoring state change request on a shut-down state machine");
            return Ok(());
        }
        self.request_batch.new_batch()?;
        for partition in partitions {
            if let Err(e) = self.handle_state_change(partition, target, selector).await {
                if e.is_infrastructural() {
                    self.request_batch.abort();
                    return Err(e);
                }
                error!(partition = %partition, target = %target, error = %e, "Partition state transition failed");
            }
        }
        let live_brokers = self.ctx.live_broker_ids.clone();
        self.request_batch
            .send_requests_to_brokers(self.ctx.epoch, &live_brokers)
    }

    /// Try to bring every `New` or `Offline` partition online.
    ///
    /// Invoked after controller election and on broker-membership changes.
    /// Invoking it again with no external input change is a no-op that
    /// sends nothing.
    pub async fn trigger_online_partition_state_change(&mut self) -> ControllerResult<()> {
        let candidates: Vec<TopicPartition> = {
            let mut c: Vec<TopicPartition> = self
                .partition_state
                .iter()
                .filter(|(_, state)| state.needs_leader())
                .map(|(tp, _)| tp.clone())
                .collect();
            c.sort();
            c
        };
        if !candidates.is_empty() {
            info!(partitions = candidates.len(), "Triggering online state change for new/offline partitions");
        }
        self.handle_state_changes(&candidates, PartitionState::Online, None)
            .await
    }

    /// Reconstruct the context caches and the state map from durable
    /// metadata. No durable writes; classification only.
    async fn initialize_partition_state(&mut self) -> ControllerResult<()> {
        let topics = self.store.get_children(paths::BROKER_TOPICS_PATH).await?;
        self.ctx.all_topics = topics.iter().cloned().collect();
        for topic in &topics {
            let assignment = self.read_topic_assignment(topic).await?;
            for (partition, replicas) in assignment {
                self.ctx
                    .partition_replica_assignment
                    .insert(TopicPartition::new(topic.clone(), partition), replicas);
            }
        }

        let partitions: Vec<TopicPartition> = self
            .ctx
            .partition_replica_assignment
            .keys()
            .cloned()
            .collect();
        let mut online = 0usize;
        let mut offline = 0usize;
        let mut fresh = 0usize;
        for partition in partitions {
            let path = paths::partition_state_path(&partition.topic, partition.partition);
            let state = match self.store.read_data(&path).await? {
                None => {
                    fresh += 1;
                    PartitionState::New
                }
                Some((payload, version)) => {
                    let record = paths::decode_partition_state(&path, &payload, version)?;
                    let leader_live = self.ctx.is_broker_live(record.leader_and_isr.leader);
                    self.ctx
                        .partition_leadership
                        .insert(partition.clone(), record);
                    if leader_live {
                        online += 1;
                        PartitionState::Online
                    } else {
                        offline += 1;
                        PartitionState::Offline
                    }
                }
            };
            self.set_state(&partition, state);
        }
        info!(
            topics = self.ctx.all_topics.len(),
            online, offline, new = fresh,
            "Reconstructed partition state from durable metadata"
        );
        Ok(())
    }

    /// Dispatch one partition toward `target`, enforcing the legal-transition
    /// table.
    async fn handle_state_change(
        &mut self,
        partition: &TopicPartition,
        target: PartitionState,
        selector: Option<&dyn PartitionLeaderSelector>,
    ) -> ControllerResult<()> {
        let current = self.state_of(partition);
        if !target.can_transition_from(current) {
            metrics::ILLEGAL_TRANSITIONS
                .with_label_values(&[target.state_name()])
                .inc();
            return Err(ControllerError::IllegalStateTransition {
                partition: partition.clone(),
                from: current.state_name(),
                to: target.state_name(),
                legal: target.legal_sources_names(),
            });
        }

        match target {
            PartitionState::New => {
                self.assign_replicas_from_store(partition).await?;
                self.set_state(partition, PartitionState::New);
                debug!(partition = %partition, "Partition created with cached replica assignment");
            }
            PartitionState::Online => {
                match current {
                    PartitionState::New => {
                        self.initialize_leader_and_isr_for_partition(partition).await?
                    }
                    PartitionState::Offline | PartitionState::Online => {
                        // Re-election from Online handles forced leader moves.
                        let default_selector;
                        let selector = match selector {
                            Some(s) => s,
                            None => {
                                default_selector = OfflinePartitionLeaderSelector::new(
                                    self.config.unclean_leader_election,
                                );
                                &default_selector
                            }
                        };
                        self.elect_leader_for_partition(partition, selector).await?
                    }
                    PartitionState::NonExistent => unreachable!("guarded by the transition table"),
                }
                self.set_state(partition, PartitionState::Online);
                info!(
                    partition = %partition,
                    leader = %self
                        .ctx
                        .partition_leadership
                        .get(partition)
                        .map(|r| r.leader_and_isr.leader)
                        .unwrap_or(BrokerId::INVALID),
                    "Partition is online"
                );
            }
            PartitionState::Offline => {
                // The leadership cache entry stays; it records the last-known
                // leader and the node version the next election will fence on.
                self.set_state(partition, PartitionState::Offline);
                info!(partition = %partition, "Partition marked offline");
            }
            PartitionState::NonExistent => {
                // Durable node removal belongs to the deletion subsystem.
                self.set_state(partition, PartitionState::NonExistent);
                info!(partition = %partition, "Partition removed from the state machine");
            }
        }
        Ok(())
    }

    /// `NonExistent -> New`: cache the replica assignment read from the
    /// metadata store.
    async fn assign_replicas_from_store(
        &mut self,
        partition: &TopicPartition,
    ) -> ControllerResult<()> {
        let assignment = self.read_topic_assignment(&partition.topic).await?;
        let replicas = assignment.get(&partition.partition).cloned().ok_or_else(|| {
            ControllerError::state_change_failed(
                partition,
                "topic assignment node has no entry for this partition",
            )
        })?;
        if replicas.is_empty() {
            return Err(ControllerError::state_change_failed(
                partition,
                "replica assignment is empty",
            ));
        }
        self.ctx
            .partition_replica_assignment
            .insert(partition.clone(), replicas);
        Ok(())
    }

    async fn read_topic_assignment(
        &self,
        topic: &str,
    ) -> ControllerResult<std::collections::BTreeMap<i32, Vec<BrokerId>>> {
        let path = paths::topic_path(topic);
        match self.store.read_data(&path).await? {
            None => Ok(Default::default()),
            Some((payload, _)) => Ok(paths::decode_topic_assignment(&path, &payload)?),
        }
    }

    /// `New -> Online`: first-ever election for a partition, creating the
    /// durable leader/ISR node.
    ///
    /// The create is conditional on the node being absent. A node-exists
    /// failure means a soft controller failover already initialized this
    /// partition; the observed value is surfaced in the error and the
    /// transition aborts, leaving reconciliation to a later scan.
    async fn initialize_leader_and_isr_for_partition(
        &mut self,
        partition: &TopicPartition,
    ) -> ControllerResult<()> {
        let assignment = self
            .ctx
            .replicas_for(partition)
            .ok_or_else(|| {
                ControllerError::state_change_failed(partition, "no replica assignment cached")
            })?
            .to_vec();
        let live_assigned = self.ctx.live_assigned_replicas(partition);
        if live_assigned.is_empty() {
            metrics::OFFLINE_PARTITION_RATE.inc();
            metrics::LEADER_ELECTIONS
                .with_label_values(&[OUTCOME_FAILED])
                .inc();
            return Err(ControllerError::state_change_failed(
                partition,
                format!(
                    "no assigned replica is alive; assignment {:?}, live brokers {:?}",
                    ids(&assignment),
                    sorted_live(&self.ctx)
                ),
            ));
        }

        // Preferred-replica policy: first live replica in assignment order
        // leads, and every live assigned replica starts in the ISR.
        let leader = live_assigned[0];
        let record = LeaderIsrAndControllerEpoch {
            leader_and_isr: LeaderAndIsr::initial(leader, live_assigned.clone()),
            controller_epoch: self.ctx.epoch,
        };
        let path = paths::partition_state_path(&partition.topic, partition.partition);
        match self
            .store
            .create_persistent(&path, paths::encode_partition_state(&record))
            .await
        {
            Ok(()) => {
                debug!(partition = %partition, leader = %leader, "Created leader/ISR node");
                self.request_batch.add_leader_and_isr_request_for_brokers(
                    &live_assigned,
                    partition,
                    &record,
                    &assignment,
                )?;
                self.ctx
                    .partition_leadership
                    .insert(partition.clone(), record);
                metrics::LEADER_ELECTIONS
                    .with_label_values(&[OUTCOME_SUCCESS])
                    .inc();
                Ok(())
            }
            Err(StoreError::NodeExists(_)) => {
                let observed = match self.store.read_data(&path).await? {
                    Some((payload, version)) => {
                        paths::decode_partition_state(&path, &payload, version)
                            .map(|r| r.to_string())
                            .unwrap_or_else(|_| "<undecodable payload>".to_string())
                    }
                    None => "<concurrently removed>".to_string(),
                };
                metrics::OFFLINE_PARTITION_RATE.inc();
                metrics::LEADER_ELECTIONS
                    .with_label_values(&[OUTCOME_FAILED])
                    .inc();
                Err(ControllerError::state_change_failed(
                    partition,
                    format!(
                        "leader/ISR node already exists with {}; another controller likely \
                         initialized it during a soft failover",
                        observed
                    ),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `Offline/Online -> Online`: elect against an existing durable node
    /// with a conditional write, fenced by the controller epoch.
    ///
    /// Exposed because the reassignment subsystem and the broker-failure
    /// handler invoke it directly. When no batch pass is in flight the
    /// method runs as its own pass (opens and flushes a batch); inside a
    /// pass it only queues into the open batch. Election does not move the
    /// state map; drive `handle_state_changes` for that.
    pub async fn elect_leader_for_partition(
        &mut self,
        partition: &TopicPartition,
        selector: &dyn PartitionLeaderSelector,
    ) -> ControllerResult<()> {
        let standalone = !self.request_batch.is_open();
        if standalone {
            self.request_batch.new_batch()?;
        }
        let result = self.elect_leader_in_open_batch(partition, selector).await;
        if standalone {
            match result {
                Ok(()) => {
                    let live_brokers = self.ctx.live_broker_ids.clone();
                    self.request_batch
                        .send_requests_to_brokers(self.ctx.epoch, &live_brokers)
                }
                Err(e) => {
                    self.request_batch.abort();
                    Err(e)
                }
            }
        } else {
            result
        }
    }

    async fn elect_leader_in_open_batch(
        &mut self,
        partition: &TopicPartition,
        selector: &dyn PartitionLeaderSelector,
    ) -> ControllerResult<()> {
        debug!(partition = %partition, "Starting leader election");
        let path = paths::partition_state_path(&partition.topic, partition.partition);

        let mut attempts: u32 = 0;
        let (record, notify_replicas) = loop {
            attempts += 1;
            if attempts > self.config.max_election_attempts {
                metrics::LEADER_ELECTIONS
                    .with_label_values(&[OUTCOME_FAILED])
                    .inc();
                return Err(ControllerError::state_change_failed(
                    partition,
                    format!(
                        "conditional write still contended after {} attempts",
                        self.config.max_election_attempts
                    ),
                ));
            }

            let Some((payload, version)) = self.store.read_data(&path).await? else {
                metrics::LEADER_ELECTIONS
                    .with_label_values(&[OUTCOME_FAILED])
                    .inc();
                return Err(ControllerError::state_change_failed(
                    partition,
                    "leader and ISR info doesn't exist in the metadata store",
                ));
            };
            let current = paths::decode_partition_state(&path, &payload, version)?;

            if current.controller_epoch > self.ctx.epoch {
                metrics::LEADER_ELECTIONS
                    .with_label_values(&[OUTCOME_FENCED])
                    .inc();
                return Err(ControllerError::state_change_failed(
                    partition,
                    format!(
                        "aborted: leader/ISR node was written at controller epoch {}, newer than \
                         this controller's epoch {}; another controller has taken over",
                        current.controller_epoch, self.ctx.epoch
                    ),
                ));
            }

            let selection =
                match selector.select_leader(partition, &current.leader_and_isr, &self.ctx) {
                    Ok(selection) => selection,
                    Err(ControllerError::NoReplicaOnline {
                        partition,
                        live,
                        candidates,
                    }) => {
                        metrics::LEADER_ELECTIONS
                            .with_label_values(&[OUTCOME_FAILED])
                            .inc();
                        return Err(ControllerError::PartitionOffline {
                            reason: format!(
                                "no replica online; live brokers {:?}, candidates {:?}",
                                live, candidates
                            ),
                            partition,
                        });
                    }
                    Err(e) => {
                        metrics::LEADER_ELECTIONS
                            .with_label_values(&[OUTCOME_FAILED])
                            .inc();
                        return Err(e);
                    }
                };

            let mut new_leader_and_isr = selection.leader_and_isr;
            let proposed = LeaderIsrAndControllerEpoch {
                leader_and_isr: new_leader_and_isr.clone(),
                controller_epoch: self.ctx.epoch,
            };
            match self
                .store
                .conditional_update(
                    &path,
                    paths::encode_partition_state(&proposed),
                    current.leader_and_isr.node_version,
                )
                .await?
            {
                Some(new_version) => {
                    new_leader_and_isr.node_version = new_version;
                    break (
                        LeaderIsrAndControllerEpoch {
                            leader_and_isr: new_leader_and_isr,
                            controller_epoch: self.ctx.epoch,
                        },
                        selection.notify_replicas,
                    );
                }
                None => {
                    debug!(
                        partition = %partition,
                        attempt = attempts,
                        expected_version = current.leader_and_isr.node_version,
                        "Conditional write conflicted; re-reading and retrying"
                    );
                }
            }
        };

        let assignment = self
            .ctx
            .replicas_for(partition)
            .map(<[BrokerId]>::to_vec)
            .unwrap_or_default();
        self.request_batch.add_leader_and_isr_request_for_brokers(
            &notify_replicas,
            partition,
            &record,
            &assignment,
        )?;
        info!(
            partition = %partition,
            leader = %record.leader_and_isr.leader,
            leader_epoch = record.leader_and_isr.leader_epoch,
            node_version = record.leader_and_isr.node_version,
            "Elected new leader"
        );
        self.ctx.partition_leadership.insert(partition.clone(), record);
        metrics::LEADER_ELECTIONS
            .with_label_values(&[OUTCOME_SUCCESS])
            .inc();
        Ok(())
    }

    fn set_state(&mut self, partition: &TopicPartition, target: PartitionState) {
        let previous = self.state_of(partition);
        if target == PartitionState::NonExistent {
            self.partition_state.remove(partition);
        } else {
            self.partition_state.insert(partition.clone(), target);
        }
        if previous != PartitionState::NonExistent {
            metrics::PARTITIONS_BY_STATE
                .with_label_values(&[previous.state_name()])
                .dec();
        }
        if target != PartitionState::NonExistent {
            metrics::PARTITIONS_BY_STATE
                .with_label_values(&[target.state_name()])
                .inc();
        }
    }
}

fn ids(brokers: &[BrokerId]) -> Vec<i32> {
    brokers.iter().map(|b| b.value()).collect()
}

fn sorted_live(ctx: &ControllerContext) -> Vec<i32> {
    let mut live: Vec<i32> = ctx.live_broker_ids.iter().map(|b| b.value()).collect();
    live.sort_unstable();
    live
}
