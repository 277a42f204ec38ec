//! AWS session construction
//!
//! The SDK config is built once at startup and the client handles are passed
//! down into the backends; nothing below `main` reaches for a global session.

use crate::config::AwsConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ec2::config::Credentials;

/// Build the shared SDK config from the `[aws]` config section.
///
/// The region always comes from config. Static credentials are used when
/// both keys are present; otherwise the default provider chain applies
/// (environment, shared profile, instance role).
pub async fn load_sdk_config(cfg: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(cfg.region.clone()));

    if let (Some(key), Some(secret)) = (&cfg.access_key_id, &cfg.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key.clone(),
            secret.clone(),
            None,
            None,
            "reapctl-config",
        ));
    }

    loader.load().await
}
