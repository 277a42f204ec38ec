//! Error types for reapctl
//!
//! Library code uses `crate::error::Result<T>` which returns `ReapctlError`.
//! CLI code uses `anyhow::Result<T>` for top-level error handling; the
//! conversion happens at the CLI boundary and preserves error chains.
//!
//! ## Retry Awareness
//!
//! Errors implement `IsRetryable` so the `RetryPolicy` in `src/retry.rs` can
//! decide whether an operation should be attempted again. Only transport-ish
//! failures (`CloudProvider`, `Io`, `Retryable`) are retryable.
//!
//! `MetricUnavailable` is deliberately NOT retryable: the check cycle treats
//! an unreadable CPU metric as a policy decision (abort or record-and-skip),
//! never as something to paper over with retries. A missing datapoint must
//! never be mistaken for zero utilization.

use thiserror::Error;

/// Main error type for reapctl
#[derive(Error, Debug)]
pub enum ReapctlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cloud provider error: {provider} - {message}")]
    CloudProvider {
        provider: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The monitoring backend returned no usable CPU datapoint for an
    /// instance. Always names the offending instance.
    #[error("failed to fetch CPU utilization for instance '{instance_id}'")]
    MetricUnavailable {
        instance_id: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Retryable error (attempt {attempt}/{max_attempts}): {reason}")]
    Retryable {
        attempt: u32,
        max_attempts: u32,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS SDK error: {0}")]
    Aws(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ReapctlError>;

/// Trait for determining if an error is retryable
///
/// Used by `RetryPolicy` implementations to decide whether an error should
/// trigger another attempt.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ReapctlError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReapctlError::Retryable { .. }
                | ReapctlError::CloudProvider { .. }
                | ReapctlError::Io(_)
        )
    }
}
