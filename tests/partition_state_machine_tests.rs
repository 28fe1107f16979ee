//! Tests for the partition state machine lifecycle.
//!
//! These tests verify:
//! 1. Startup reconstruction of partition state from durable metadata
//! 2. The fresh-topic path from NonExistent through New to Online
//! 3. Legal-transition enforcement with per-partition containment
//! 4. Idempotence of the online trigger
//! 5. Shutdown semantics

use std::collections::BTreeMap;
use std::sync::Arc;

use conductor::controller::mock_store::{InMemoryMetadataStore, RecordingRequestSender};
use conductor::controller::{
    ControllerConfig, ControllerContext, ControllerEventLoop, MetadataStore, PartitionState,
    PartitionStateMachine, paths,
};
use conductor::types::{BrokerId, LeaderAndIsr, LeaderIsrAndControllerEpoch, TopicPartition};

// ============================================================================
// Helpers
// ============================================================================

fn brokers(ids: &[i32]) -> Vec<BrokerId> {
    ids.iter().map(|&b| BrokerId(b)).collect()
}

async fn seed_topic(store: &InMemoryMetadataStore, topic: &str, assignment: &[(i32, &[i32])]) {
    let map: BTreeMap<i32, Vec<BrokerId>> = assignment
        .iter()
        .map(|(partition, replicas)| (*partition, brokers(replicas)))
        .collect();
    store
        .create_persistent(&paths::topic_path(topic), paths::encode_topic_assignment(&map))
        .await
        .unwrap();
}

async fn seed_partition_state(
    store: &InMemoryMetadataStore,
    topic: &str,
    partition: i32,
    leader: i32,
    isr: &[i32],
    controller_epoch: i32,
) {
    let record = LeaderIsrAndControllerEpoch {
        leader_and_isr: LeaderAndIsr::initial(BrokerId(leader), brokers(isr)),
        controller_epoch,
    };
    store
        .create_persistent(
            &paths::partition_state_path(topic, partition),
            paths::encode_partition_state(&record),
        )
        .await
        .unwrap();
}

fn controller(
    store: &Arc<InMemoryMetadataStore>,
    sender: &Arc<RecordingRequestSender>,
    epoch: i32,
    live: &[i32],
) -> ControllerEventLoop<InMemoryMetadataStore> {
    let ctx = ControllerContext::new(epoch, brokers(live));
    let machine = PartitionStateMachine::new(
        store.clone(),
        sender.clone(),
        ctx,
        ControllerConfig::default(),
    );
    ControllerEventLoop::new(machine, store.clone())
}

// ============================================================================
// Startup reconstruction
// ============================================================================

#[tokio::test]
async fn test_startup_classifies_and_repairs_partitions() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());

    // p0 has no durable node (New), p1's leader is alive (Online),
    // p2's leader is dead (Offline).
    seed_topic(&store, "t", &[(0, &[1, 2, 3]), (1, &[2, 3]), (2, &[3, 1])]).await;
    seed_partition_state(&store, "t", 1, 2, &[2, 3], 1).await;
    seed_partition_state(&store, "t", 2, 3, &[3, 1], 1).await;

    let mut controller = controller(&store, &sender, 2, &[1, 2]);
    controller.startup().await.unwrap();
    let machine = controller.state_machine();

    // The startup trigger brings every partition to Online.
    for partition in 0..3 {
        assert_eq!(
            machine.state_of(&TopicPartition::new("t", partition)),
            PartitionState::Online,
            "t-{} should be online",
            partition
        );
    }

    // p0 was initialized: first live assigned replica leads, all live
    // assigned replicas form the ISR, node created at version 0.
    let p0 = machine
        .context()
        .partition_leadership
        .get(&TopicPartition::new("t", 0))
        .unwrap();
    assert_eq!(p0.leader_and_isr.leader, BrokerId(1));
    assert_eq!(p0.leader_and_isr.isr, brokers(&[1, 2]));
    assert_eq!(p0.leader_and_isr.node_version, 0);
    assert_eq!(p0.controller_epoch, 2);

    // p1's leader was alive: untouched, version still 0.
    assert_eq!(
        store
            .node_version(&paths::partition_state_path("t", 1))
            .await,
        Some(0)
    );

    // p2 was re-elected: broker 1 is the only live ISR member.
    let p2 = machine
        .context()
        .partition_leadership
        .get(&TopicPartition::new("t", 2))
        .unwrap();
    assert_eq!(p2.leader_and_isr.leader, BrokerId(1));
    assert_eq!(p2.leader_and_isr.isr, brokers(&[1]));
    assert_eq!(p2.leader_and_isr.node_version, 1);

    // One aggregated request per affected broker for the whole pass:
    // broker 1 hosts p0 and p2, broker 2 hosts p0 only, p1 sent nothing.
    let to_broker1 = sender.requests_for(BrokerId(1));
    assert_eq!(to_broker1.len(), 1);
    assert_eq!(to_broker1[0].partitions.len(), 2);
    assert_eq!(to_broker1[0].controller_epoch, 2);
    let to_broker2 = sender.requests_for(BrokerId(2));
    assert_eq!(to_broker2.len(), 1);
    assert_eq!(to_broker2[0].partitions.len(), 1);
}

#[tokio::test]
async fn test_startup_is_idempotent() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());
    seed_topic(&store, "t", &[(0, &[1, 2])]).await;

    let mut controller = controller(&store, &sender, 1, &[1, 2]);
    controller.startup().await.unwrap();
    assert_eq!(
        controller
            .state_machine()
            .state_of(&TopicPartition::new("t", 0)),
        PartitionState::Online
    );

    sender.clear();
    controller.startup().await.unwrap();
    assert_eq!(
        controller
            .state_machine()
            .state_of(&TopicPartition::new("t", 0)),
        PartitionState::Online
    );
    // Everything was already online: the second startup sends nothing.
    assert_eq!(sender.total_requests(), 0);
}

// ============================================================================
// Fresh topic path (NonExistent -> New -> Online)
// ============================================================================

#[tokio::test]
async fn test_fresh_topic_two_partitions_three_brokers() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());
    seed_topic(&store, "t", &[(0, &[1, 2, 3]), (1, &[2, 3, 1])]).await;

    let mut controller = controller(&store, &sender, 5, &[1, 2, 3]);
    let machine = controller.state_machine_mut();
    let partitions = [TopicPartition::new("t", 0), TopicPartition::new("t", 1)];

    machine
        .handle_state_changes(&partitions, PartitionState::New, None)
        .await
        .unwrap();
    assert_eq!(machine.state_of(&partitions[0]), PartitionState::New);
    assert_eq!(machine.state_of(&partitions[1]), PartitionState::New);
    assert_eq!(sender.total_requests(), 0, "New transitions notify nobody");

    machine
        .handle_state_changes(&partitions, PartitionState::Online, None)
        .await
        .unwrap();

    let p0 = machine.context().partition_leadership[&partitions[0]].clone();
    assert_eq!(p0.leader_and_isr.leader, BrokerId(1));
    assert_eq!(p0.leader_and_isr.isr, brokers(&[1, 2, 3]));
    assert_eq!(p0.leader_and_isr.node_version, 0);
    assert_eq!(p0.controller_epoch, 5);

    let p1 = machine.context().partition_leadership[&partitions[1]].clone();
    assert_eq!(p1.leader_and_isr.leader, BrokerId(2));
    assert_eq!(p1.leader_and_isr.isr, brokers(&[2, 3, 1]));

    // Durable nodes exist at version 0.
    for partition in &partitions {
        assert_eq!(
            store
                .node_version(&paths::partition_state_path("t", partition.partition))
                .await,
            Some(0)
        );
    }

    // Each of the three brokers receives exactly one request covering both
    // partitions.
    for broker in [1, 2, 3] {
        let requests = sender.requests_for(BrokerId(broker));
        assert_eq!(requests.len(), 1, "broker {} request count", broker);
        assert_eq!(requests[0].partitions.len(), 2);
        assert_eq!(requests[0].controller_epoch, 5);
    }
}

// ============================================================================
// Legal-transition enforcement
// ============================================================================

#[tokio::test]
async fn test_illegal_transition_skips_partition_but_continues_batch() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());
    seed_topic(&store, "t", &[(0, &[1]), (1, &[1])]).await;

    let mut controller = controller(&store, &sender, 1, &[1]);
    let machine = controller.state_machine_mut();
    let p0 = TopicPartition::new("t", 0);
    let p1 = TopicPartition::new("t", 1);

    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::New, None)
        .await
        .unwrap();
    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::Online, None)
        .await
        .unwrap();

    // p0 is Online: Online -> New is illegal and must not move it. p1 is
    // NonExistent: its transition in the same batch still succeeds.
    machine
        .handle_state_changes(&[p0.clone(), p1.clone()], PartitionState::New, None)
        .await
        .unwrap();
    assert_eq!(machine.state_of(&p0), PartitionState::Online);
    assert_eq!(machine.state_of(&p1), PartitionState::New);
}

#[tokio::test]
async fn test_non_existent_requires_offline() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());
    seed_topic(&store, "t", &[(0, &[1])]).await;

    let mut controller = controller(&store, &sender, 1, &[1]);
    let machine = controller.state_machine_mut();
    let p0 = TopicPartition::new("t", 0);

    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::New, None)
        .await
        .unwrap();
    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::Online, None)
        .await
        .unwrap();

    // Online -> NonExistent is illegal.
    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::NonExistent, None)
        .await
        .unwrap();
    assert_eq!(machine.state_of(&p0), PartitionState::Online);

    // Offline -> NonExistent removes the entry.
    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::Offline, None)
        .await
        .unwrap();
    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::NonExistent, None)
        .await
        .unwrap();
    assert_eq!(machine.state_of(&p0), PartitionState::NonExistent);
    assert!(machine.partitions_in_state(PartitionState::Offline).is_empty());
}

#[tokio::test]
async fn test_offline_keeps_leadership_cache_and_writes_nothing() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());
    seed_topic(&store, "t", &[(0, &[1, 2])]).await;

    let mut controller = controller(&store, &sender, 1, &[1, 2]);
    controller.startup().await.unwrap();
    sender.clear();

    let machine = controller.state_machine_mut();
    let p0 = TopicPartition::new("t", 0);
    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::Offline, None)
        .await
        .unwrap();

    assert_eq!(machine.state_of(&p0), PartitionState::Offline);
    // Last-known leadership stays cached for the next election's
    // conditional write, and the durable node is untouched.
    assert!(machine.context().partition_leadership.contains_key(&p0));
    assert_eq!(
        store
            .node_version(&paths::partition_state_path("t", 0))
            .await,
        Some(0)
    );
    assert_eq!(sender.total_requests(), 0);
}

// ============================================================================
// Idempotence of the online trigger
// ============================================================================

#[tokio::test]
async fn test_trigger_online_twice_sends_nothing_new() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());
    seed_topic(&store, "t", &[(0, &[1, 2]), (1, &[2, 1])]).await;

    let mut controller = controller(&store, &sender, 1, &[1, 2]);
    controller.startup().await.unwrap();

    let machine = controller.state_machine_mut();
    let leadership_before = machine.context().partition_leadership.clone();
    sender.clear();

    machine.trigger_online_partition_state_change().await.unwrap();

    assert_eq!(sender.total_requests(), 0);
    assert_eq!(machine.context().partition_leadership, leadership_before);
    assert_eq!(machine.partitions_in_state(PartitionState::Online).len(), 2);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_clears_state_and_gates_entry_points() {
    let store = Arc::new(InMemoryMetadataStore::new());
    let sender = Arc::new(RecordingRequestSender::default());
    seed_topic(&store, "t", &[(0, &[1])]).await;

    let mut controller = controller(&store, &sender, 1, &[1]);
    controller.startup().await.unwrap();
    controller.shutdown();
    sender.clear();

    let machine = controller.state_machine_mut();
    let p0 = TopicPartition::new("t", 0);
    assert!(machine.is_shut_down());
    assert_eq!(machine.state_of(&p0), PartitionState::NonExistent);

    // Entry points no-op after shutdown.
    machine
        .handle_state_changes(std::slice::from_ref(&p0), PartitionState::New, None)
        .await
        .unwrap();
    assert_eq!(machine.state_of(&p0), PartitionState::NonExistent);
    assert_eq!(sender.total_requests(), 0);
}
