//! Backend seams and domain types for the check cycle
//!
//! The evaluator in `src/cycle.rs` only ever talks to the cloud through the
//! two traits defined here, so the AWS client handles stay
//! dependency-injected (constructed once in `main`, passed down) and the
//! cycle logic is testable against in-memory implementations.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A virtual-machine instance as seen by one check cycle.
///
/// `tags` is `None` when the backend returned no tag collection at all; the
/// exemption check is total over that, see [`crate::cycle::has_exemption_tag`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub state: InstanceState,
    pub tags: Option<Vec<(String, String)>>,
}

/// Instance lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    Terminated,
    Unknown,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Terminated => "terminated",
            InstanceState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Map a backend state string to an `InstanceState`
pub fn normalize_state(state_str: &str) -> InstanceState {
    match state_str {
        "pending" => InstanceState::Pending,
        "running" => InstanceState::Running,
        "shutting-down" => InstanceState::ShuttingDown,
        "stopping" => InstanceState::Stopping,
        "stopped" => InstanceState::Stopped,
        "terminated" => InstanceState::Terminated,
        _ => InstanceState::Unknown,
    }
}

/// Instance inventory and termination commands
///
/// Implementations must handle backend pagination transparently:
/// `list_instances` returns the complete, finite inventory for the account.
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    /// Enumerate all instances visible to the account
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Request termination of a single instance
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;
}

/// Time-windowed utilization statistics for a single instance
#[async_trait]
pub trait UtilizationSource: Send + Sync {
    /// Average CPU utilization (percent) over `[now - window, now]` at
    /// `period` granularity.
    ///
    /// Fails with `MetricUnavailable` when no reliable value exists; callers
    /// must never substitute a default.
    async fn fetch_utilization(
        &self,
        instance_id: &str,
        window: Duration,
        period: Duration,
    ) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_state_known_values() {
        assert_eq!(normalize_state("running"), InstanceState::Running);
        assert_eq!(normalize_state("pending"), InstanceState::Pending);
        assert_eq!(normalize_state("shutting-down"), InstanceState::ShuttingDown);
        assert_eq!(normalize_state("stopping"), InstanceState::Stopping);
        assert_eq!(normalize_state("stopped"), InstanceState::Stopped);
        assert_eq!(normalize_state("terminated"), InstanceState::Terminated);
    }

    #[test]
    fn test_normalize_state_unknown_values() {
        assert_eq!(normalize_state(""), InstanceState::Unknown);
        assert_eq!(normalize_state("rebooting"), InstanceState::Unknown);
        // State matching is exact, not case-folded
        assert_eq!(normalize_state("Running"), InstanceState::Unknown);
    }

    #[test]
    fn test_state_display_round_trip() {
        for state in [
            InstanceState::Pending,
            InstanceState::Running,
            InstanceState::ShuttingDown,
            InstanceState::Stopping,
            InstanceState::Stopped,
            InstanceState::Terminated,
        ] {
            assert_eq!(normalize_state(&state.to_string()), state);
        }
    }
}
