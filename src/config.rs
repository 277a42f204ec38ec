use crate::cycle::{CheckPolicy, FailurePolicy};
use crate::error::ConfigError;
use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub aws: AwsConfig,
    pub policy: PolicyConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    /// Static credentials. When absent, the default AWS credential chain
    /// (environment, profile, instance role) is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Instances strictly below this average CPU percentage are terminated
    pub cpu_threshold_percent: f64,
    /// Metric lookback window, in hours
    pub lookback_hours: u64,
    /// Metric sampling period, in seconds (CloudWatch requires a multiple of 60)
    pub period_seconds: u64,
    /// Tag key/value pair that opts an instance out of termination
    pub exemption_tag_key: String,
    pub exemption_tag_value: String,
    /// What to do when an instance's CPU metric cannot be read
    #[serde(default)]
    pub on_metric_failure: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local times of day ("HH:MM") at which `watch` runs a check cycle
    pub times: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                access_key_id: None,
                secret_access_key: None,
            },
            policy: PolicyConfig {
                cpu_threshold_percent: 10.0,
                lookback_hours: 2,
                period_seconds: 300,
                exemption_tag_key: "Debug".to_string(),
                exemption_tag_value: "yes".to_string(),
                on_metric_failure: FailurePolicy::Abort,
            },
            schedule: ScheduleConfig {
                times: vec!["09:00".to_string()],
            },
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            // Try .reapctl.toml in current dir, then ~/.config/reapctl/config.toml
            let local = PathBuf::from(".reapctl.toml");
            if local.exists() {
                local
            } else {
                dirs::config_dir()
                    .map(|d| d.join("reapctl").join("config.toml"))
                    .unwrap_or_else(|| PathBuf::from(".reapctl.toml"))
            }
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
            let config: Config = toml::from_str(&content).with_context(|| {
                format!(
                    "Failed to parse config: {}\n  Tip: Run 'reapctl init' to create a new config file",
                    config_path.display()
                )
            })?;
            Ok(config)
        } else {
            // Use defaults but warn if user explicitly provided a path
            if path.is_some() {
                eprintln!("WARNING: Config file not found: {}", config_path.display());
                eprintln!("   Using default configuration. Run 'reapctl init' to create a config file.");
            }
            Ok(Config::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Validate the policy and schedule sections.
    ///
    /// The core never validates; anything it consumes must be rejected here.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let p = &self.policy;

        if !p.cpu_threshold_percent.is_finite() || p.cpu_threshold_percent <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.cpu_threshold_percent".to_string(),
                reason: "must be a positive percentage".to_string(),
            });
        }
        if p.lookback_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.lookback_hours".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if p.period_seconds == 0 || p.period_seconds % 60 != 0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.period_seconds".to_string(),
                reason: "must be a positive multiple of 60".to_string(),
            });
        }
        if p.exemption_tag_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "policy.exemption_tag_key".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        for time in &self.schedule.times {
            if NaiveTime::parse_from_str(time, "%H:%M").is_err() {
                return Err(ConfigError::InvalidValue {
                    field: "schedule.times".to_string(),
                    reason: format!("'{}' is not a valid HH:MM time", time),
                });
            }
        }

        if self.aws.region.is_empty() {
            return Err(ConfigError::MissingField("aws.region".to_string()));
        }

        Ok(())
    }

    /// Build the policy the check cycle consumes
    pub fn check_policy(&self) -> std::result::Result<CheckPolicy, ConfigError> {
        self.validate()?;
        Ok(CheckPolicy {
            cpu_threshold_percent: self.policy.cpu_threshold_percent,
            lookback: Duration::from_secs(self.policy.lookback_hours * 3600),
            period: Duration::from_secs(self.policy.period_seconds),
            exemption_tag_key: self.policy.exemption_tag_key.clone(),
            exemption_tag_value: self.policy.exemption_tag_value.clone(),
            on_metric_failure: self.policy.on_metric_failure,
        })
    }
}

pub fn init_config(output: &Path) -> Result<()> {
    let config = Config::default();
    config.save(output)?;
    println!("Created config file: {}", output.display());
    Ok(())
}
