//! Centralized configuration constants.
//!
//! This module consolidates the magic numbers used throughout the controller
//! core. Having them in one place makes it easier to:
//!
//! - Understand the controller's defaults
//! - Update values consistently
//! - Document the rationale for each constant

// =============================================================================
// Leadership Constants
// =============================================================================

/// Leader epoch assigned when a partition's leader/ISR node is first created.
///
/// Every subsequent leader election increments the epoch by one, so replicas
/// can order leadership generations and discard messages from stale leaders.
pub const INITIAL_LEADER_EPOCH: i32 = 0;

/// Version a freshly created metadata-store node starts at.
///
/// The store bumps the version on every conditional update; the controller
/// mirrors the last-observed version for optimistic concurrency control.
pub const INITIAL_NODE_VERSION: i32 = 0;

// =============================================================================
// Election Constants
// =============================================================================

/// Default cap on conditional-write attempts in the leader election loop.
///
/// The loop is version-driven: each failed attempt re-reads the node and
/// either observes a higher controller epoch (abort) or a newer version, so
/// it terminates once contention clears. The cap bounds the pathological
/// case where an external writer keeps racing the controller; exhaustion
/// surfaces a state-change failure instead of spinning.
pub const DEFAULT_MAX_ELECTION_ATTEMPTS: u32 = 16;

// =============================================================================
// Environment Variables
// =============================================================================

/// Enables the unclean-election fallback of the offline leader selector.
pub const ENV_UNCLEAN_LEADER_ELECTION: &str = "UNCLEAN_LEADER_ELECTION";

/// Overrides the election attempt cap.
pub const ENV_MAX_ELECTION_ATTEMPTS: &str = "MAX_ELECTION_ATTEMPTS";

// =============================================================================
// Tests
// =============================================================================
