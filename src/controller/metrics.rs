//! Prometheus metrics for the controller core.
//!
//! Metrics cover:
//! - Partitions that could not be placed online (`offline_partition_rate`)
//! - Leader elections by outcome
//! - Illegal transition attempts
//! - Outgoing leader-and-ISR request fan-out per broker
//! - Partition counts by lifecycle state
//!
//! # Safety
//!
//! Everything registers against a dedicated registry prefixed `conductor`
//! so the controller never collides with other libraries that use the
//! default Prometheus registry. A metric whose registration fails degrades
//! to an unexported instance rather than panicking the controller.

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGaugeVec, Registry, TextEncoder, opts,
};
use tracing::warn;

/// Dedicated Prometheus registry for controller metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("conductor".to_string()), None).unwrap_or_else(|_| Registry::new())
});

/// Register a metric, degrading to an unexported instance on failure.
fn register<C: Collector + Clone + 'static>(registry: &Registry, metric: C, name: &str) -> C {
    if let Err(e) = registry.register(Box::new(metric.clone())) {
        warn!(name, error = %e, "Metric registration failed; metric will not be exported");
    }
    metric
}

/// Declare an IntCounter metric (no labels).
macro_rules! define_counter {
    ($name:ident, $metric_name:expr, $help:expr) => {
        #[doc = $help]
        pub static $name: Lazy<IntCounter> = Lazy::new(|| {
            register(
                &REGISTRY,
                IntCounter::new($metric_name, $help).expect("metric name/help should be valid"),
                $metric_name,
            )
        });
    };
}

/// Declare an IntCounterVec metric with labels.
macro_rules! define_counter_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<IntCounterVec> = Lazy::new(|| {
            register(
                &REGISTRY,
                IntCounterVec::new(opts!($metric_name, $help), &[$($label),+])
                    .expect("metric opts should be valid"),
                $metric_name,
            )
        });
    };
}

/// Declare an IntGaugeVec metric with labels.
macro_rules! define_gauge_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<IntGaugeVec> = Lazy::new(|| {
            register(
                &REGISTRY,
                IntGaugeVec::new(opts!($metric_name, $help), &[$($label),+])
                    .expect("metric opts should be valid"),
                $metric_name,
            )
        });
    };
}

// =============================================================================
// Election metrics
// =============================================================================

define_counter!(
    OFFLINE_PARTITION_RATE,
    "offline_partition_rate",
    "Partitions for which leader placement failed because no eligible replica was alive"
);
define_counter_vec!(
    LEADER_ELECTIONS,
    "leader_elections_total",
    "Leader election attempts by outcome",
    ["outcome"]
);

// =============================================================================
// State machine metrics
// =============================================================================

define_counter_vec!(
    ILLEGAL_TRANSITIONS,
    "illegal_transitions_total",
    "Rejected partition state transitions by target state",
    ["target"]
);
define_gauge_vec!(
    PARTITIONS_BY_STATE,
    "partitions",
    "Partition count by lifecycle state",
    ["state"]
);

// =============================================================================
// Broker fan-out metrics
// =============================================================================

define_counter_vec!(
    LEADER_AND_ISR_REQUESTS,
    "leader_and_isr_requests_total",
    "Aggregated leader-and-ISR requests dispatched per broker",
    ["broker"]
);
define_counter_vec!(
    LEADER_AND_ISR_REQUEST_PARTITIONS,
    "leader_and_isr_request_partitions_total",
    "Partition entries carried by dispatched leader-and-ISR requests, per broker",
    ["broker"]
);

/// Gather all metric families from the registry.
pub fn gather_metrics() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

/// Render the registry in Prometheus text exposition format.
pub fn render_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
