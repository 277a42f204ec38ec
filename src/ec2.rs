//! EC2 implementation of the instance inventory
//!
//! `DescribeInstances` is paginated with `next_token`; callers always see
//! the complete inventory. List and terminate calls go through the cloud-API
//! retry policy.

use crate::error::{ReapctlError, Result};
use crate::provider::{normalize_state, Instance, InstanceInventory, InstanceState};
use crate::retry::{ExponentialBackoffPolicy, RetryPolicy};
use async_trait::async_trait;
use aws_sdk_ec2::Client as Ec2Client;
use tracing::{debug, info};

pub struct Ec2Inventory {
    client: Ec2Client,
}

impl Ec2Inventory {
    pub fn new(client: Ec2Client) -> Self {
        Self { client }
    }
}

/// Convert an SDK instance to the domain type.
///
/// The tag collection stays `Option`al: EC2 omitting it entirely is distinct
/// from an empty tag list, and the exemption check treats both as not
/// exempt.
fn to_domain(instance: &aws_sdk_ec2::types::Instance) -> Instance {
    let id = instance.instance_id().unwrap_or_default().to_string();
    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|n| normalize_state(n.as_str()))
        .unwrap_or(InstanceState::Unknown);
    let tags = instance.tags.as_ref().map(|tags| {
        tags.iter()
            .filter_map(|t| {
                t.key()
                    .zip(t.value())
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect()
    });
    Instance { id, state, tags }
}

#[async_trait]
impl InstanceInventory for Ec2Inventory {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = ExponentialBackoffPolicy::for_cloud_api()
                .execute_with_retry(|| async {
                    self.client
                        .describe_instances()
                        .set_next_token(next_token.clone())
                        .send()
                        .await
                        .map_err(|e| ReapctlError::CloudProvider {
                            provider: "aws".to_string(),
                            message: format!("Failed to describe instances: {}", e),
                            source: None,
                        })
                })
                .await?;

            for reservation in response.reservations() {
                for instance in reservation.instances() {
                    instances.push(to_domain(instance));
                }
            }

            next_token = response.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        debug!("Enumerated {} instances", instances.len());
        Ok(instances)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        let response = ExponentialBackoffPolicy::for_cloud_api()
            .execute_with_retry(|| async {
                self.client
                    .terminate_instances()
                    .instance_ids(instance_id)
                    .send()
                    .await
                    .map_err(|e| ReapctlError::CloudProvider {
                        provider: "aws".to_string(),
                        message: format!(
                            "Failed to terminate instance {}: {}",
                            instance_id, e
                        ),
                        source: None,
                    })
            })
            .await?;

        for change in response.terminating_instances() {
            info!(
                "Instance {} state: {} -> {}",
                change.instance_id().unwrap_or(instance_id),
                change
                    .previous_state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str())
                    .unwrap_or("unknown"),
                change
                    .current_state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str())
                    .unwrap_or("unknown"),
            );
        }

        Ok(())
    }
}
