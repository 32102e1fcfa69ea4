//! Centralized configuration for Ration.
//!
//! All tunable simulation parameters are defined here to avoid hard-coded
//! values scattered throughout the codebase.

use std::fmt;

use serde::Serialize;

/// How deadlock recovery picks its victim.
///
/// The recovery loop keeps aborting blocked tasks until the *head* of the
/// blocked queue can be granted its pending request. The original
/// formulation aborts the lowest task id in the entire blocked collection,
/// which need not be the head; if the head is never the lowest id,
/// unrelated tasks can be sacrificed repeatedly before the head's request
/// frees up. Both interpretations are available, defaulting to the
/// original for compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryVictimPolicy {
    /// Abort the lowest task id across the whole blocked collection.
    #[default]
    LowestTaskId,
    /// Abort the head of the blocked queue, the task gating recovery.
    BlockedHead,
}

impl fmt::Display for RecoveryVictimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryVictimPolicy::LowestTaskId => write!(f, "lowest-task-id"),
            RecoveryVictimPolicy::BlockedHead => write!(f, "blocked-head"),
        }
    }
}

impl std::str::FromStr for RecoveryVictimPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lowest-task-id" | "lowest" => Ok(RecoveryVictimPolicy::LowestTaskId),
            "blocked-head" | "head" => Ok(RecoveryVictimPolicy::BlockedHead),
            _ => Err(format!("Invalid victim policy: {s}")),
        }
    }
}

/// Simulation parameters shared by both scheduling policies.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Victim selection during deadlock recovery (detection mode only).
    pub victim_policy: RecoveryVictimPolicy,
    /// Ceiling on simulated cycles; a run past this fails rather than
    /// spinning forever on a malformed task set.
    pub max_cycles: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            victim_policy: RecoveryVictimPolicy::default(),
            max_cycles: 100_000,
        }
    }
}

impl SimulationConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(policy) = std::env::var("RATION_VICTIM_POLICY") {
            if let Ok(value) = policy.parse() {
                config.victim_policy = value;
            }
        }

        if let Ok(cycles) = std::env::var("RATION_MAX_CYCLES") {
            if let Ok(value) = cycles.parse::<u32>() {
                config.max_cycles = value;
            }
        }

        config
    }

    /// Creates a configuration for fast deterministic tests.
    pub fn for_testing() -> Self {
        Self {
            max_cycles: 10_000,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SimulationConfig::default();

        assert_eq!(config.victim_policy, RecoveryVictimPolicy::LowestTaskId);
        assert_eq!(config.max_cycles, 100_000);
    }

    #[test]
    fn test_victim_policy_parsing() {
        assert_eq!(
            "lowest-task-id".parse::<RecoveryVictimPolicy>().unwrap(),
            RecoveryVictimPolicy::LowestTaskId
        );
        assert_eq!(
            "head".parse::<RecoveryVictimPolicy>().unwrap(),
            RecoveryVictimPolicy::BlockedHead
        );
        assert!("fairest".parse::<RecoveryVictimPolicy>().is_err());
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("RATION_VICTIM_POLICY", "blocked-head");
            std::env::set_var("RATION_MAX_CYCLES", "500");
        }

        let config = SimulationConfig::from_env();

        assert_eq!(config.victim_policy, RecoveryVictimPolicy::BlockedHead);
        assert_eq!(config.max_cycles, 500);

        // Cleanup
        unsafe {
            std::env::remove_var("RATION_VICTIM_POLICY");
            std::env::remove_var("RATION_MAX_CYCLES");
        }
    }
}
