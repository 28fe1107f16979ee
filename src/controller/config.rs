//! Configuration for the controller core.

use crate::constants::{
    DEFAULT_MAX_ELECTION_ATTEMPTS, ENV_MAX_ELECTION_ATTEMPTS, ENV_UNCLEAN_LEADER_ELECTION,
};

/// Tunable behavior of the partition state machine.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Allow the offline leader selector to fall back to a live assigned
    /// replica outside the ISR when no ISR member is alive.
    ///
    /// Electing outside the ISR can lose acknowledged writes; the fallback
    /// is disabled by default and logged loudly when taken.
    pub unclean_leader_election: bool,

    /// Cap on conditional-write attempts per leader election.
    ///
    /// Must be at least 1. Exhaustion surfaces a state-change failure for
    /// the contended partition.
    pub max_election_attempts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            unclean_leader_election: false,
            max_election_attempts: DEFAULT_MAX_ELECTION_ATTEMPTS,
        }
    }
}

impl ControllerConfig {
    /// Build a configuration from environment variables.
    ///
    /// - `UNCLEAN_LEADER_ELECTION`: `true`/`1` to enable the fallback
    /// - `MAX_ELECTION_ATTEMPTS`: positive integer cap on election retries
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();

        let unclean_leader_election = std::env::var(ENV_UNCLEAN_LEADER_ELECTION)
            .map(|v| {
                let v = v.to_lowercase();
                v == "true" || v == "1"
            })
            .unwrap_or(defaults.unclean_leader_election);

        let max_election_attempts: u32 = match std::env::var(ENV_MAX_ELECTION_ATTEMPTS) {
            Ok(v) => v
                .parse()
                .map_err(|e| format!("Invalid {}: {}", ENV_MAX_ELECTION_ATTEMPTS, e))?,
            Err(_) => defaults.max_election_attempts,
        };

        let config = Self {
            unclean_leader_election,
            max_election_attempts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.max_election_attempts == 0 {
            return Err("max_election_attempts must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_safe() {
        let config = ControllerConfig::default();
        assert!(!config.unclean_leader_election);
        assert_eq!(config.max_election_attempts, DEFAULT_MAX_ELECTION_ATTEMPTS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_attempt_cap_rejected() {
        let config = ControllerConfig {
            max_election_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
