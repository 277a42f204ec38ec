//! Presentation of cycle reports and the inventory overview

use crate::cycle::{has_exemption_tag, CheckPolicy, CycleReport, InstanceOutcome};
use crate::error::Result;
use crate::provider::{InstanceInventory, InstanceState, UtilizationSource};
use comfy_table::{Cell, Table};

/// Render a cycle report to stdout, as a table or as JSON
pub fn print_report(report: &CycleReport, output_format: &str) -> Result<()> {
    if output_format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.records.is_empty() {
        println!("No instances found");
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Instance ID", "Outcome", "CPU %"]);

        for record in &report.records {
            let (outcome_cell, cpu_text) = match &record.outcome {
                InstanceOutcome::SkippedNotRunning { state } => (
                    Cell::new(format!("skipped ({})", state))
                        .fg(comfy_table::Color::Yellow),
                    "-".to_string(),
                ),
                InstanceOutcome::Exempt { cpu_percent } => (
                    Cell::new("exempt").fg(comfy_table::Color::Green),
                    format!("{:.1}", cpu_percent),
                ),
                InstanceOutcome::Terminated { cpu_percent } => (
                    Cell::new(if report.dry_run {
                        "would terminate"
                    } else {
                        "terminated"
                    })
                    .fg(comfy_table::Color::Red),
                    format!("{:.1}", cpu_percent),
                ),
                InstanceOutcome::Spared { cpu_percent } => {
                    (Cell::new("spared"), format!("{:.1}", cpu_percent))
                }
                InstanceOutcome::MetricFailed { message } => (
                    Cell::new(format!("metric failed: {}", message))
                        .fg(comfy_table::Color::Yellow),
                    "-".to_string(),
                ),
            };
            table.add_row(vec![
                Cell::new(&record.instance_id),
                outcome_cell,
                Cell::new(cpu_text),
            ]);
        }
        println!("{table}");
    }

    let prefix = if report.dry_run { "Dry run: " } else { "" };
    println!(
        "\n{}{} terminated, {} exempt, {} spared, {} skipped, {} failed",
        prefix,
        report.terminated_count(),
        report.exempt_count(),
        report.spared_count(),
        report.skipped_count(),
        report.failed_count()
    );

    Ok(())
}

/// Show the account's instance inventory.
///
/// With `with_cpu`, the utilization of running instances is fetched
/// best-effort; unlike the check cycle, a failed fetch here just renders as
/// "n/a". This is an observation command and makes no decisions.
pub async fn show_inventory(
    inventory: &dyn InstanceInventory,
    metrics: &dyn UtilizationSource,
    policy: &CheckPolicy,
    with_cpu: bool,
    output_format: &str,
) -> Result<()> {
    let instances = inventory.list_instances().await?;

    if output_format == "json" {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!("No instances found");
        return Ok(());
    }

    let mut table = Table::new();
    let mut header = vec!["Instance ID", "State", "Exempt"];
    if with_cpu {
        header.push("CPU %");
    }
    table.set_header(header);

    for instance in &instances {
        let exempt = has_exemption_tag(
            instance.tags.as_deref(),
            &policy.exemption_tag_key,
            &policy.exemption_tag_value,
        );

        let state_cell = match instance.state {
            InstanceState::Running => {
                Cell::new(instance.state.to_string()).fg(comfy_table::Color::Green)
            }
            InstanceState::Stopped => {
                Cell::new(instance.state.to_string()).fg(comfy_table::Color::Yellow)
            }
            InstanceState::Terminated => {
                Cell::new(instance.state.to_string()).fg(comfy_table::Color::Red)
            }
            _ => Cell::new(instance.state.to_string()),
        };

        let mut row = vec![
            Cell::new(&instance.id),
            state_cell,
            Cell::new(if exempt { "yes" } else { "no" }),
        ];

        if with_cpu {
            let cpu_text = if instance.state == InstanceState::Running {
                match metrics
                    .fetch_utilization(&instance.id, policy.lookback, policy.period)
                    .await
                {
                    Ok(cpu) => format!("{:.1}", cpu),
                    Err(_) => "n/a".to_string(),
                }
            } else {
                "-".to_string()
            };
            row.push(Cell::new(cpu_text));
        }

        table.add_row(row);
    }

    println!("{table}");
    Ok(())
}
