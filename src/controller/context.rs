//! In-memory cache of cluster metadata owned by the controller.

use std::collections::{HashMap, HashSet};

use crate::types::{BrokerId, LeaderIsrAndControllerEpoch, TopicPartition};

/// Everything the elected controller knows about the cluster.
///
/// The context is a single owned value threaded through the partition state
/// machine; the controller event loop has exclusive `&mut` access, which is
/// what serializes all mutations. Collaborators that track broker liveness
/// or drive reassignment mutate it through the accessors here.
#[derive(Debug, Default)]
pub struct ControllerContext {
    /// Generation number of this controller. Every durable write carries it.
    pub epoch: i32,

    /// Brokers currently considered alive by the liveness tracker.
    pub live_broker_ids: HashSet<BrokerId>,

    /// Brokers undergoing controlled shutdown; still live, but no longer
    /// eligible to lead.
    pub shutting_down_broker_ids: HashSet<BrokerId>,

    /// Every topic known to the controller.
    pub all_topics: HashSet<String>,

    /// Assigned replicas per partition, in preference order. Immutable for
    /// a given partition while this controller runs; reassignment is a
    /// separate subsystem.
    pub partition_replica_assignment: HashMap<TopicPartition, Vec<BrokerId>>,

    /// Last-known leadership per partition, for partitions whose election
    /// has ever succeeded.
    pub partition_leadership: HashMap<TopicPartition, LeaderIsrAndControllerEpoch>,

    /// Target replica sets of in-flight reassignments, consumed by the
    /// reassigned-partition leader selector.
    pub partitions_being_reassigned: HashMap<TopicPartition, Vec<BrokerId>>,
}

impl ControllerContext {
    /// Context for a freshly elected controller at `epoch`.
    pub fn new(epoch: i32, live_broker_ids: impl IntoIterator<Item = BrokerId>) -> Self {
        ControllerContext {
            epoch,
            live_broker_ids: live_broker_ids.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Whether `broker` is in the live set.
    pub fn is_broker_live(&self, broker: BrokerId) -> bool {
        self.live_broker_ids.contains(&broker)
    }

    /// Live brokers eligible to lead: alive and not shutting down.
    pub fn is_broker_eligible(&self, broker: BrokerId) -> bool {
        self.is_broker_live(broker) && !self.shutting_down_broker_ids.contains(&broker)
    }

    /// Assigned replicas for a partition, if known.
    pub fn replicas_for(&self, partition: &TopicPartition) -> Option<&[BrokerId]> {
        self.partition_replica_assignment
            .get(partition)
            .map(Vec::as_slice)
    }

    /// Assigned replicas that are currently live, preserving assignment
    /// order (the head is the preferred leader).
    pub fn live_assigned_replicas(&self, partition: &TopicPartition) -> Vec<BrokerId> {
        self.replicas_for(partition)
            .map(|replicas| {
                replicas
                    .iter()
                    .copied()
                    .filter(|b| self.is_broker_live(*b))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All cached partitions of one topic.
    pub fn partitions_for_topic(&self, topic: &str) -> Vec<TopicPartition> {
        let mut partitions: Vec<TopicPartition> = self
            .partition_replica_assignment
            .keys()
            .filter(|tp| tp.topic == topic)
            .cloned()
            .collect();
        partitions.sort();
        partitions
    }

    /// Drop every cache entry belonging to `topic`.
    ///
    /// State-map entries for the topic's partitions are not touched here;
    /// tearing those down is the deletion subsystem's job.
    pub fn evict_topic(&mut self, topic: &str) {
        self.all_topics.remove(topic);
        self.partition_replica_assignment
            .retain(|tp, _| tp.topic != topic);
        self.partitions_being_reassigned
            .retain(|tp, _| tp.topic != topic);
    }

    /// Replace the live-broker set.
    pub fn set_live_brokers(&mut self, brokers: impl IntoIterator<Item = BrokerId>) {
        self.live_broker_ids = brokers.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> ControllerContext {
        let mut ctx = ControllerContext::new(1, [BrokerId(1), BrokerId(2)]);
        ctx.all_topics.insert("orders".to_string());
        ctx.partition_replica_assignment.insert(
            TopicPartition::new("orders", 0),
            vec![BrokerId(1), BrokerId(2), BrokerId(3)],
        );
        ctx.partition_replica_assignment.insert(
            TopicPartition::new("orders", 1),
            vec![BrokerId(3), BrokerId(1)],
        );
        ctx
    }

    #[test]
    fn test_live_assigned_replicas_preserve_order() {
        let ctx = sample_context();
        let live = ctx.live_assigned_replicas(&TopicPartition::new("orders", 0));
        assert_eq!(live, vec![BrokerId(1), BrokerId(2)]);
    }

    #[test]
    fn test_live_assigned_replicas_unknown_partition_is_empty() {
        let ctx = sample_context();
        assert!(ctx
            .live_assigned_replicas(&TopicPartition::new("nope", 0))
            .is_empty());
    }

    #[test]
    fn test_eligibility_excludes_shutting_down() {
        let mut ctx = sample_context();
        ctx.shutting_down_broker_ids.insert(BrokerId(2));
        assert!(ctx.is_broker_live(BrokerId(2)));
        assert!(!ctx.is_broker_eligible(BrokerId(2)));
        assert!(ctx.is_broker_eligible(BrokerId(1)));
    }

    #[test]
    fn test_evict_topic_drops_assignments_only_for_that_topic() {
        let mut ctx = sample_context();
        ctx.partition_replica_assignment
            .insert(TopicPartition::new("other", 0), vec![BrokerId(1)]);
        ctx.evict_topic("orders");
        assert!(!ctx.all_topics.contains("orders"));
        assert!(ctx.partitions_for_topic("orders").is_empty());
        assert_eq!(ctx.partitions_for_topic("other").len(), 1);
    }

    #[test]
    fn test_partitions_for_topic_sorted() {
        let ctx = sample_context();
        let partitions = ctx.partitions_for_topic("orders");
        assert_eq!(
            partitions,
            vec![
                TopicPartition::new("orders", 0),
                TopicPartition::new("orders", 1)
            ]
        );
    }
}
