//! Check cycle behavior against in-memory backends
//!
//! These tests drive `run_check_cycle` through the provider traits with
//! mock inventory and metric sources, covering the skip/exempt/terminate
//! decisions and both metric-failure policies.

use async_trait::async_trait;
use reapctl::cycle::{run_check_cycle, CheckPolicy, FailurePolicy, InstanceOutcome};
use reapctl::error::{ReapctlError, Result};
use reapctl::provider::{Instance, InstanceInventory, InstanceState, UtilizationSource};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

struct MockInventory {
    instances: Vec<Instance>,
    terminated: Mutex<Vec<String>>,
}

impl MockInventory {
    fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances,
            terminated: Mutex::new(Vec::new()),
        }
    }

    fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceInventory for MockInventory {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        Ok(self.instances.clone())
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        self.terminated.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }
}

/// Metric source backed by a map; instances without an entry fail with
/// `MetricUnavailable`, like an empty CloudWatch response.
struct MockMetrics {
    cpu: HashMap<String, f64>,
    fetched: Mutex<Vec<String>>,
}

impl MockMetrics {
    fn new(cpu: &[(&str, f64)]) -> Self {
        Self {
            cpu: cpu
                .iter()
                .map(|(id, value)| (id.to_string(), *value))
                .collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl UtilizationSource for MockMetrics {
    async fn fetch_utilization(
        &self,
        instance_id: &str,
        _window: Duration,
        _period: Duration,
    ) -> Result<f64> {
        self.fetched.lock().unwrap().push(instance_id.to_string());
        match self.cpu.get(instance_id) {
            Some(cpu) => Ok(*cpu),
            None => Err(ReapctlError::MetricUnavailable {
                instance_id: instance_id.to_string(),
                source: None,
            }),
        }
    }
}

fn policy() -> CheckPolicy {
    CheckPolicy {
        cpu_threshold_percent: 10.0,
        lookback: Duration::from_secs(2 * 3600),
        period: Duration::from_secs(300),
        exemption_tag_key: "Debug".to_string(),
        exemption_tag_value: "yes".to_string(),
        on_metric_failure: FailurePolicy::Abort,
    }
}

fn instance(id: &str, state: InstanceState, tags: Option<&[(&str, &str)]>) -> Instance {
    Instance {
        id: id.to_string(),
        state,
        tags: tags.map(|pairs| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }),
    }
}

#[tokio::test]
async fn test_idle_untagged_instance_is_terminated() {
    let inventory = MockInventory::new(vec![instance(
        "i-a",
        InstanceState::Running,
        Some(&[]),
    )]);
    let metrics = MockMetrics::new(&[("i-a", 5.0)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    assert_eq!(inventory.terminated(), vec!["i-a".to_string()]);
    assert_eq!(report.records.len(), 1);
    assert_eq!(
        report.records[0].outcome,
        InstanceOutcome::Terminated { cpu_percent: 5.0 }
    );
}

#[tokio::test]
async fn test_exempt_instance_is_spared_regardless_of_cpu() {
    let inventory = MockInventory::new(vec![
        instance("i-b", InstanceState::Running, Some(&[("Debug", "yes")])),
        instance("i-zero", InstanceState::Running, Some(&[("Debug", "yes")])),
    ]);
    let metrics = MockMetrics::new(&[("i-b", 1.0), ("i-zero", 0.0)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    assert!(inventory.terminated().is_empty());
    assert_eq!(report.exempt_count(), 2);
}

#[tokio::test]
async fn test_exemption_is_case_sensitive() {
    let inventory = MockInventory::new(vec![instance(
        "i-c",
        InstanceState::Running,
        Some(&[("Debug", "Yes")]),
    )]);
    let metrics = MockMetrics::new(&[("i-c", 1.0)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    // "Yes" is not "yes" - the instance is not exempt and gets terminated
    assert_eq!(inventory.terminated(), vec!["i-c".to_string()]);
    assert_eq!(report.terminated_count(), 1);
}

#[tokio::test]
async fn test_missing_tag_collection_is_not_exempt() {
    let inventory = MockInventory::new(vec![instance("i-d", InstanceState::Running, None)]);
    let metrics = MockMetrics::new(&[("i-d", 3.0)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    assert_eq!(inventory.terminated(), vec!["i-d".to_string()]);
    assert_eq!(report.terminated_count(), 1);
}

#[tokio::test]
async fn test_non_running_instances_are_skipped_without_fetch() {
    let inventory = MockInventory::new(vec![
        instance("i-stopped", InstanceState::Stopped, Some(&[])),
        instance("i-pending", InstanceState::Pending, Some(&[])),
        instance("i-stopping", InstanceState::Stopping, Some(&[])),
    ]);
    let metrics = MockMetrics::new(&[]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    // No metric fetch and no termination for any of them
    assert!(metrics.fetched().is_empty());
    assert!(inventory.terminated().is_empty());
    assert_eq!(report.skipped_count(), 3);
    assert_eq!(
        report.records[0].outcome,
        InstanceOutcome::SkippedNotRunning {
            state: InstanceState::Stopped
        }
    );
}

#[tokio::test]
async fn test_at_threshold_is_spared() {
    let inventory = MockInventory::new(vec![instance("i-f", InstanceState::Running, Some(&[]))]);
    let metrics = MockMetrics::new(&[("i-f", 10.0)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    assert!(inventory.terminated().is_empty());
    assert_eq!(
        report.records[0].outcome,
        InstanceOutcome::Spared { cpu_percent: 10.0 }
    );
}

#[tokio::test]
async fn test_metric_failure_aborts_cycle_naming_instance() {
    // i-d has no metric data; i-e is listed after it and must never be
    // evaluated in this cycle
    let inventory = MockInventory::new(vec![
        instance("i-d", InstanceState::Running, Some(&[])),
        instance("i-e", InstanceState::Running, Some(&[])),
    ]);
    let metrics = MockMetrics::new(&[("i-e", 5.0)]);

    let result = run_check_cycle(&inventory, &metrics, &policy(), false).await;

    match result {
        Err(ReapctlError::MetricUnavailable { instance_id, .. }) => {
            assert_eq!(instance_id, "i-d");
        }
        other => panic!("expected MetricUnavailable for i-d, got {:?}", other),
    }
    assert_eq!(metrics.fetched(), vec!["i-d".to_string()]);
    assert!(inventory.terminated().is_empty());
}

#[tokio::test]
async fn test_continue_policy_records_failure_and_proceeds() {
    let inventory = MockInventory::new(vec![
        instance("i-d", InstanceState::Running, Some(&[])),
        instance("i-e", InstanceState::Running, Some(&[])),
    ]);
    let metrics = MockMetrics::new(&[("i-e", 5.0)]);

    let mut continue_policy = policy();
    continue_policy.on_metric_failure = FailurePolicy::Continue;

    let report = run_check_cycle(&inventory, &metrics, &continue_policy, false)
        .await
        .unwrap();

    // The failing instance is recorded, never terminated; evaluation
    // continues with the rest of the inventory
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.terminated_count(), 1);
    assert_eq!(inventory.terminated(), vec!["i-e".to_string()]);
    assert!(matches!(
        report.records[0].outcome,
        InstanceOutcome::MetricFailed { .. }
    ));
}

#[tokio::test]
async fn test_dry_run_issues_no_terminations() {
    let inventory = MockInventory::new(vec![instance("i-a", InstanceState::Running, Some(&[]))]);
    let metrics = MockMetrics::new(&[("i-a", 5.0)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), true)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.terminated_count(), 1);
    assert!(inventory.terminated().is_empty());
}

#[tokio::test]
async fn test_outcomes_preserve_enumeration_order() {
    let inventory = MockInventory::new(vec![
        instance("i-1", InstanceState::Stopped, Some(&[])),
        instance("i-2", InstanceState::Running, Some(&[("Debug", "yes")])),
        instance("i-3", InstanceState::Running, Some(&[])),
        instance("i-4", InstanceState::Running, Some(&[])),
    ]);
    let metrics = MockMetrics::new(&[("i-2", 1.0), ("i-3", 4.0), ("i-4", 50.0)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    let ids: Vec<&str> = report
        .records
        .iter()
        .map(|r| r.instance_id.as_str())
        .collect();
    assert_eq!(ids, vec!["i-1", "i-2", "i-3", "i-4"]);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.exempt_count(), 1);
    assert_eq!(report.terminated_count(), 1);
    assert_eq!(report.spared_count(), 1);
}

#[tokio::test]
async fn test_empty_inventory_produces_empty_report() {
    let inventory = MockInventory::new(vec![]);
    let metrics = MockMetrics::new(&[]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    assert!(report.records.is_empty());
    assert_eq!(report.terminated_count(), 0);
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let inventory = MockInventory::new(vec![
        instance("i-1", InstanceState::Running, Some(&[])),
        instance("i-2", InstanceState::Stopped, Some(&[])),
    ]);
    let metrics = MockMetrics::new(&[("i-1", 2.5)]);

    let report = run_check_cycle(&inventory, &metrics, &policy(), false)
        .await
        .unwrap();

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"outcome\":\"terminated\""));
    assert!(json.contains("\"instance_id\":\"i-1\""));
    assert!(json.contains("\"outcome\":\"skipped_not_running\""));
}
