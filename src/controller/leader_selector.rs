//! Pluggable leader election policies.
//!
//! A selector computes, for one partition, the next leader and ISR given the
//! current durable leadership record and the controller's view of the
//! cluster. The state machine persists whatever the selector returns via a
//! conditional write, so selectors are pure policy: no I/O, no mutation.
//!
//! Every successful selection bumps the leader epoch so replicas can order
//! leadership generations.

use tracing::{info, warn};

use super::context::ControllerContext;
use super::error::{ControllerError, ControllerResult};
use crate::types::{BrokerId, LeaderAndIsr, TopicPartition};

/// Outcome of a leader selection: the record to persist and the replicas
/// that must be told about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderSelection {
    pub leader_and_isr: LeaderAndIsr,
    pub notify_replicas: Vec<BrokerId>,
}

/// A leader election policy.
pub trait PartitionLeaderSelector: Send + Sync {
    /// Compute the next leadership record for `partition`.
    fn select_leader(
        &self,
        partition: &TopicPartition,
        current: &LeaderAndIsr,
        ctx: &ControllerContext,
    ) -> ControllerResult<LeaderSelection>;
}

/// Elects a replacement for a dead leader.
///
/// Prefers live members of the current ISR in ISR order. When the whole ISR
/// is dead the selector optionally falls back to any live assigned replica,
/// resetting the ISR to just the new leader; that path can lose acknowledged
/// writes and is disabled unless `unclean_leader_election` is set.
pub struct OfflinePartitionLeaderSelector {
    unclean_leader_election: bool,
}

impl OfflinePartitionLeaderSelector {
    pub fn new(unclean_leader_election: bool) -> Self {
        Self {
            unclean_leader_election,
        }
    }
}

impl PartitionLeaderSelector for OfflinePartitionLeaderSelector {
    fn select_leader(
        &self,
        partition: &TopicPartition,
        current: &LeaderAndIsr,
        ctx: &ControllerContext,
    ) -> ControllerResult<LeaderSelection> {
        let assigned = ctx.replicas_for(partition).ok_or_else(|| {
            ControllerError::state_change_failed(partition, "no replica assignment cached")
        })?;
        let live_assigned = ctx.live_assigned_replicas(partition);
        let live_isr: Vec<BrokerId> = current
            .isr
            .iter()
            .copied()
            .filter(|b| ctx.is_broker_live(*b))
            .collect();

        if let Some(&leader) = live_isr.first() {
            info!(
                partition = %partition,
                leader = %leader,
                isr = ?live_isr.iter().map(|b| b.value()).collect::<Vec<_>>(),
                "Elected leader from live ISR"
            );
            return Ok(LeaderSelection {
                leader_and_isr: current.next_generation(leader, live_isr),
                notify_replicas: live_assigned,
            });
        }

        if self.unclean_leader_election {
            if let Some(&leader) = live_assigned.first() {
                warn!(
                    partition = %partition,
                    leader = %leader,
                    "No live ISR member; unclean leader election from assigned replicas, \
                     acknowledged writes may be lost"
                );
                return Ok(LeaderSelection {
                    leader_and_isr: current.next_generation(leader, vec![leader]),
                    notify_replicas: live_assigned,
                });
            }
        }

        Err(ControllerError::NoReplicaOnline {
            partition: partition.clone(),
            live: sorted_ids(&ctx.live_broker_ids.iter().copied().collect::<Vec<_>>()),
            candidates: assigned.iter().map(|b| b.value()).collect(),
        })
    }
}

/// Moves leadership back to the head of the replica assignment.
///
/// Fails when the preferred replica already leads, is dead, or has fallen
/// out of the ISR. The ISR is left unchanged.
pub struct PreferredReplicaPartitionLeaderSelector;

impl PartitionLeaderSelector for PreferredReplicaPartitionLeaderSelector {
    fn select_leader(
        &self,
        partition: &TopicPartition,
        current: &LeaderAndIsr,
        ctx: &ControllerContext,
    ) -> ControllerResult<LeaderSelection> {
        let assigned = ctx.replicas_for(partition).ok_or_else(|| {
            ControllerError::state_change_failed(partition, "no replica assignment cached")
        })?;
        let preferred = *assigned.first().ok_or_else(|| {
            ControllerError::state_change_failed(partition, "empty replica assignment")
        })?;

        if preferred == current.leader {
            return Err(ControllerError::state_change_failed(
                partition,
                format!("preferred replica {} is already the leader", preferred),
            ));
        }
        if !ctx.is_broker_live(preferred) || !current.isr.contains(&preferred) {
            return Err(ControllerError::state_change_failed(
                partition,
                format!(
                    "preferred replica {} is not live or not in the ISR {:?}",
                    preferred,
                    current.isr.iter().map(|b| b.value()).collect::<Vec<_>>()
                ),
            ));
        }

        info!(partition = %partition, leader = %preferred, "Moving leadership to preferred replica");
        Ok(LeaderSelection {
            leader_and_isr: current.next_generation(preferred, current.isr.clone()),
            notify_replicas: assigned.to_vec(),
        })
    }
}

/// Moves leadership off brokers undergoing controlled shutdown.
///
/// Shrinks the ISR by the shutting-down set and elects the first remaining
/// live ISR member. Shutting-down brokers are not notified.
pub struct ControlledShutdownLeaderSelector;

impl PartitionLeaderSelector for ControlledShutdownLeaderSelector {
    fn select_leader(
        &self,
        partition: &TopicPartition,
        current: &LeaderAndIsr,
        ctx: &ControllerContext,
    ) -> ControllerResult<LeaderSelection> {
        let new_isr: Vec<BrokerId> = current
            .isr
            .iter()
            .copied()
            .filter(|b| !ctx.shutting_down_broker_ids.contains(b))
            .collect();
        let leader = new_isr
            .iter()
            .copied()
            .find(|b| ctx.is_broker_eligible(*b))
            .ok_or_else(|| {
                ControllerError::state_change_failed(
                    partition,
                    "no live ISR member outside the shutting-down set",
                )
            })?;

        let notify_replicas: Vec<BrokerId> = ctx
            .live_assigned_replicas(partition)
            .into_iter()
            .filter(|b| ctx.is_broker_eligible(*b))
            .collect();

        info!(partition = %partition, leader = %leader, "Moved leadership off shutting-down broker");
        Ok(LeaderSelection {
            leader_and_isr: current.next_generation(leader, new_isr),
            notify_replicas,
        })
    }
}

/// Elects a leader from the target replica set of an in-flight reassignment.
///
/// The candidate must already be live and caught up (in the current ISR).
pub struct ReassignedPartitionLeaderSelector;

impl PartitionLeaderSelector for ReassignedPartitionLeaderSelector {
    fn select_leader(
        &self,
        partition: &TopicPartition,
        current: &LeaderAndIsr,
        ctx: &ControllerContext,
    ) -> ControllerResult<LeaderSelection> {
        let reassigned = ctx
            .partitions_being_reassigned
            .get(partition)
            .ok_or_else(|| {
                ControllerError::state_change_failed(partition, "no reassignment in flight")
            })?;
        let leader = reassigned
            .iter()
            .copied()
            .find(|b| ctx.is_broker_live(*b) && current.isr.contains(b))
            .ok_or_else(|| {
                ControllerError::state_change_failed(
                    partition,
                    format!(
                        "none of the reassigned replicas {:?} is live and in the ISR",
                        reassigned.iter().map(|b| b.value()).collect::<Vec<_>>()
                    ),
                )
            })?;

        info!(partition = %partition, leader = %leader, "Elected leader from reassigned replicas");
        Ok(LeaderSelection {
            leader_and_isr: current.next_generation(leader, current.isr.clone()),
            notify_replicas: reassigned.clone(),
        })
    }
}

fn sorted_ids(brokers: &[BrokerId]) -> Vec<i32> {
    let mut ids: Vec<i32> = brokers.iter().map(|b| b.value()).collect();
    ids.sort_unstable();
    ids
}
