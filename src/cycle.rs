//! The check cycle: evaluate every instance against the CPU policy
//!
//! One cycle enumerates the account's instances in backend order, skips
//! anything that is not running, reads the average CPU utilization for the
//! rest, and terminates instances that are below the threshold and not
//! exempted by tag. Outcomes are collected into an ordered [`CycleReport`].
//!
//! A cycle holds no state between runs; every invocation reconstructs its
//! view of the world from the backend.

use crate::error::{ReapctlError, Result};
use crate::provider::{InstanceInventory, InstanceState, UtilizationSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What to do when an instance's CPU metric cannot be read.
///
/// `Abort` matches the reference behavior: the first unreadable metric is
/// fatal to the whole cycle. `Continue` records the failure as that
/// instance's outcome and keeps evaluating; the failing instance is never
/// terminated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// Policy inputs for one check cycle. Never mutated by the cycle.
#[derive(Debug, Clone)]
pub struct CheckPolicy {
    /// Instances strictly below this average CPU percentage are terminated
    pub cpu_threshold_percent: f64,
    /// Metric lookback window
    pub lookback: Duration,
    /// Metric sampling period
    pub period: Duration,
    /// Tag key/value pair that opts an instance out of termination
    pub exemption_tag_key: String,
    pub exemption_tag_value: String,
    pub on_metric_failure: FailurePolicy,
}

/// Per-instance outcome of one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstanceOutcome {
    /// Instance was not running; no metric fetch, no decision
    SkippedNotRunning { state: InstanceState },
    /// Exemption tag present; spared regardless of utilization
    Exempt { cpu_percent: f64 },
    /// Below threshold and not exempt; terminate requested (or recorded, in
    /// a dry run)
    Terminated { cpu_percent: f64 },
    /// At or above threshold
    Spared { cpu_percent: f64 },
    /// CPU metric unreadable under the `continue` failure policy
    MetricFailed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    #[serde(flatten)]
    pub outcome: InstanceOutcome,
}

/// Ordered log of one cycle's per-instance outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub records: Vec<InstanceRecord>,
}

impl CycleReport {
    pub fn terminated_count(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::Terminated { .. }))
    }

    pub fn exempt_count(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::Exempt { .. }))
    }

    pub fn spared_count(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::Spared { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::SkippedNotRunning { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::MetricFailed { .. }))
    }

    fn count(&self, pred: impl Fn(&InstanceOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Exemption check as a total function over an optional tag collection.
///
/// Absent or malformed tag data resolves to "not exempt": it must never
/// save an instance from termination, and it must never error out. The
/// key/value match is case-sensitive and exact.
pub fn has_exemption_tag(tags: Option<&[(String, String)]>, key: &str, value: &str) -> bool {
    match tags {
        Some(tags) => tags.iter().any(|(k, v)| k == key && v == value),
        None => false,
    }
}

/// Termination decision: strictly below threshold and not exempt.
///
/// Utilization exactly at the threshold is spared.
pub fn should_terminate(cpu_percent: f64, threshold_percent: f64, exempt: bool) -> bool {
    !exempt && cpu_percent < threshold_percent
}

/// Run one full check cycle over the account's instance inventory.
///
/// Instances are evaluated strictly sequentially, in enumeration order.
/// Under [`FailurePolicy::Abort`] the first unreadable CPU metric fails the
/// cycle with an error naming the offending instance; instances listed after
/// it are not evaluated. In a dry run termination decisions are recorded and
/// logged but no terminate request is issued.
pub async fn run_check_cycle(
    inventory: &dyn InstanceInventory,
    metrics: &dyn UtilizationSource,
    policy: &CheckPolicy,
    dry_run: bool,
) -> Result<CycleReport> {
    let started_at = Utc::now();
    info!("Check cycle started");

    let instances = inventory.list_instances().await?;
    let mut records = Vec::with_capacity(instances.len());

    for instance in &instances {
        info!("Start checking instance {}", instance.id);

        if instance.state != InstanceState::Running {
            debug!(
                "Instance {} is {}, skipping",
                instance.id, instance.state
            );
            records.push(InstanceRecord {
                instance_id: instance.id.clone(),
                outcome: InstanceOutcome::SkippedNotRunning {
                    state: instance.state,
                },
            });
            info!("Finished checking instance {}", instance.id);
            continue;
        }

        let cpu = match metrics
            .fetch_utilization(&instance.id, policy.lookback, policy.period)
            .await
        {
            Ok(cpu) => cpu,
            Err(err) => match policy.on_metric_failure {
                FailurePolicy::Abort => {
                    error!(
                        "Aborting check cycle: CPU data unavailable for instance {}: {}",
                        instance.id, err
                    );
                    return Err(match err {
                        e @ ReapctlError::MetricUnavailable { .. } => e,
                        other => ReapctlError::MetricUnavailable {
                            instance_id: instance.id.clone(),
                            source: Some(Box::new(other)),
                        },
                    });
                }
                FailurePolicy::Continue => {
                    warn!(
                        "CPU data unavailable for instance {}, continuing: {}",
                        instance.id, err
                    );
                    records.push(InstanceRecord {
                        instance_id: instance.id.clone(),
                        outcome: InstanceOutcome::MetricFailed {
                            message: err.to_string(),
                        },
                    });
                    info!("Finished checking instance {}", instance.id);
                    continue;
                }
            },
        };

        let exempt = has_exemption_tag(
            instance.tags.as_deref(),
            &policy.exemption_tag_key,
            &policy.exemption_tag_value,
        );

        let outcome = if exempt {
            info!(
                "No need to terminate {}, exemption tag {}={} is on",
                instance.id, policy.exemption_tag_key, policy.exemption_tag_value
            );
            InstanceOutcome::Exempt { cpu_percent: cpu }
        } else if should_terminate(cpu, policy.cpu_threshold_percent, exempt) {
            if dry_run {
                info!(
                    "Dry run: would terminate instance {}, CPU usage: {}%",
                    instance.id, cpu
                );
            } else {
                info!(
                    "Terminating instance {}, CPU usage: {}%",
                    instance.id, cpu
                );
                inventory.terminate_instance(&instance.id).await?;
            }
            InstanceOutcome::Terminated { cpu_percent: cpu }
        } else {
            debug!(
                "Sparing instance {}, CPU usage {}% is at or above threshold {}%",
                instance.id, cpu, policy.cpu_threshold_percent
            );
            InstanceOutcome::Spared { cpu_percent: cpu }
        };

        records.push(InstanceRecord {
            instance_id: instance.id.clone(),
            outcome,
        });
        info!("Finished checking instance {}", instance.id);
    }

    info!("Check cycle finished");
    Ok(CycleReport {
        started_at,
        finished_at: Utc::now(),
        dry_run,
        records,
    })
}
