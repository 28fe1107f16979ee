//! Partition lifecycle states as tracked by the controller.
//!
//! This module provides an explicit state machine for partition lifecycle
//! transitions:
//! - NonExistent: never created, or fully torn down
//! - New: replica assignment is known; no leader exists yet
//! - Online: a leader exists in durable metadata
//! - Offline: a leader existed but is not among live brokers, or election
//!   failed
//!
//! # State Transitions
//!
//! ```text
//! NonExistent -> New -> Online <-> Offline
//!      ^                  |           |
//!      |                  v           |
//!      +------------- (deletion) <----+
//! ```
//!
//! Only the transitions in [`PartitionState::legal_sources`] are admissible;
//! anything else is a programming error surfaced as an illegal-transition
//! error for that partition alone. Online -> Online is explicitly legal to
//! support forced re-election of a living leader.

use std::fmt;

/// State of a partition from the controller's perspective.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PartitionState {
    /// Partition was never created or has been fully torn down.
    #[default]
    NonExistent,

    /// Replica assignment is cached; no leader has ever been elected.
    New,

    /// A leader exists in durable metadata and is live.
    Online,

    /// A leader existed but is currently dead, or initial election failed.
    Offline,
}

impl PartitionState {
    /// States a transition into `self` may legally start from.
    pub fn legal_sources(self) -> &'static [PartitionState] {
        use PartitionState::*;
        match self {
            New => &[NonExistent],
            Online => &[New, Online, Offline],
            Offline => &[New, Online],
            NonExistent => &[Offline],
        }
    }

    /// Whether a transition from `from` into `self` is admissible.
    pub fn can_transition_from(self, from: PartitionState) -> bool {
        self.legal_sources().contains(&from)
    }

    /// Whether the partition currently needs an online transition.
    pub fn needs_leader(self) -> bool {
        matches!(self, PartitionState::New | PartitionState::Offline)
    }

    /// Get a human-readable state name.
    pub fn state_name(self) -> &'static str {
        match self {
            PartitionState::NonExistent => "non-existent",
            PartitionState::New => "new",
            PartitionState::Online => "online",
            PartitionState::Offline => "offline",
        }
    }

    /// Render the legal source list for error messages.
    pub fn legal_sources_names(self) -> &'static str {
        use PartitionState::*;
        match self {
            New => "non-existent",
            Online => "new, online, offline",
            Offline => "new, online",
            NonExistent => "offline",
        }
    }
}

impl fmt::Debug for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PartitionState::NonExistent => "NonExistent",
            PartitionState::New => "New",
            PartitionState::Online => "Online",
            PartitionState::Offline => "Offline",
        })
    }
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}
