//! CloudWatch implementation of the utilization source
//!
//! Queries `GetMetricStatistics` for the `AWS/EC2` `CPUUtilization` metric
//! and reduces the returned datapoints to one average percentage. No retries
//! at this layer; how a failed fetch is handled is the check cycle's policy.

use crate::error::{ReapctlError, Result};
use crate::provider::UtilizationSource;
use async_trait::async_trait;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, StandardUnit, Statistic};
use aws_sdk_cloudwatch::Client as CloudWatchClient;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

const NAMESPACE: &str = "AWS/EC2";
const METRIC_NAME: &str = "CPUUtilization";

pub struct CloudWatchSource {
    client: CloudWatchClient,
}

impl CloudWatchSource {
    pub fn new(client: CloudWatchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UtilizationSource for CloudWatchSource {
    async fn fetch_utilization(
        &self,
        instance_id: &str,
        window: Duration,
        period: Duration,
    ) -> Result<f64> {
        let end = Utc::now();
        let start = end - chrono::Duration::seconds(window.as_secs() as i64);

        let response = self
            .client
            .get_metric_statistics()
            .namespace(NAMESPACE)
            .metric_name(METRIC_NAME)
            .dimensions(
                Dimension::builder()
                    .name("InstanceId")
                    .value(instance_id)
                    .build(),
            )
            .start_time(DateTime::from_secs(start.timestamp()))
            .end_time(DateTime::from_secs(end.timestamp()))
            .period(period.as_secs() as i32)
            .statistics(Statistic::Average)
            .unit(StandardUnit::Percent)
            .send()
            .await
            .map_err(|e| {
                ReapctlError::Aws(format!(
                    "GetMetricStatistics failed for {}: {}",
                    instance_id, e
                ))
            })?;

        let datapoints = response.datapoints();
        if datapoints.is_empty() {
            return Err(ReapctlError::MetricUnavailable {
                instance_id: instance_id.to_string(),
                source: None,
            });
        }

        // Average across every returned datapoint. A datapoint without an
        // average value makes the whole fetch unusable; it is never treated
        // as zero.
        let mut sum = 0.0;
        for dp in datapoints {
            match dp.average() {
                Some(avg) => sum += avg,
                None => {
                    return Err(ReapctlError::MetricUnavailable {
                        instance_id: instance_id.to_string(),
                        source: None,
                    });
                }
            }
        }
        let cpu = sum / datapoints.len() as f64;

        debug!(
            "Instance {} average CPU over {} datapoint(s): {}%",
            instance_id,
            datapoints.len(),
            cpu
        );
        Ok(cpu)
    }
}
