//! Times-of-day trigger loop for daemon mode
//!
//! The daemon sleeps until the next configured local time, runs one check
//! cycle, and loops. Cycles are strictly sequential by construction; a
//! failed cycle is logged and the partially evaluated inventory is not
//! revisited until the next trigger.

use crate::cycle::{run_check_cycle, CheckPolicy};
use crate::error::{ConfigError, Result};
use crate::provider::{InstanceInventory, UtilizationSource};
use chrono::{DateTime, Local, NaiveTime};
use tracing::{error, info};

/// Parsed trigger times, sorted and deduplicated
#[derive(Debug, Clone)]
pub struct Schedule {
    times: Vec<NaiveTime>,
}

impl Schedule {
    pub fn parse(times: &[String]) -> std::result::Result<Self, ConfigError> {
        if times.is_empty() {
            return Err(ConfigError::MissingField("schedule.times".to_string()));
        }

        let mut parsed = Vec::with_capacity(times.len());
        for t in times {
            let time = NaiveTime::parse_from_str(t, "%H:%M").map_err(|_| {
                ConfigError::InvalidValue {
                    field: "schedule.times".to_string(),
                    reason: format!("'{}' is not a valid HH:MM time", t),
                }
            })?;
            parsed.push(time);
        }
        parsed.sort();
        parsed.dedup();

        Ok(Self { times: parsed })
    }

    /// The next trigger strictly after `now`: the earliest remaining time
    /// today, else the earliest time tomorrow.
    pub fn next_after(&self, now: DateTime<Local>) -> DateTime<Local> {
        let today = now.date_naive();
        self.times
            .iter()
            .filter_map(|t| today.and_time(*t).and_local_timezone(Local).earliest())
            .find(|candidate| *candidate > now)
            .or_else(|| {
                let tomorrow = today + chrono::Days::new(1);
                self.times
                    .first()
                    .and_then(|t| tomorrow.and_time(*t).and_local_timezone(Local).earliest())
            })
            // Unresolvable local times (DST gaps) fall back to a day later
            .unwrap_or(now + chrono::Duration::hours(24))
    }
}

/// Run check cycles forever, one per configured trigger time
pub async fn run_daemon(
    inventory: &dyn InstanceInventory,
    metrics: &dyn UtilizationSource,
    policy: &CheckPolicy,
    schedule: &Schedule,
    dry_run: bool,
) -> Result<()> {
    info!(
        "Scheduler started with {} trigger time(s)",
        schedule.times.len()
    );

    loop {
        let now = Local::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Next check cycle at {}", next.format("%Y-%m-%d %H:%M:%S"));
        tokio::time::sleep(wait).await;

        match run_check_cycle(inventory, metrics, policy, dry_run).await {
            Ok(report) => info!(
                "Cycle complete: {} terminated, {} exempt, {} spared, {} skipped, {} failed",
                report.terminated_count(),
                report.exempt_count(),
                report.spared_count(),
                report.skipped_count(),
                report.failed_count()
            ),
            Err(e) => error!("Check cycle failed: {}", e),
        }
    }
}
