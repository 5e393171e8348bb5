//! Tunables for the dispatch engine and the web push transport.

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Number of subscribers sent to concurrently before waiting for the batch to settle.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default push message time-to-live: four weeks.
pub const DEFAULT_TTL_SECS: u32 = 2_419_200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.batch_size == 0 {
            return Err(DispatchError::InvalidConfig(
                "dispatch.batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Delivery priority hint sent in the `Urgency` header (RFC 8030 §5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
}

impl Urgency {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "very-low",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Configuration for [`crate::WebPushTransport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPushConfig {
    /// Seconds the push service should retain an undelivered message.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u32,

    #[serde(default)]
    pub urgency: Urgency,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_ttl_secs() -> u32 {
    DEFAULT_TTL_SECS
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for WebPushConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            urgency: Urgency::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl WebPushConfig {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.request_timeout_ms == 0 {
            return Err(DispatchError::InvalidConfig(
                "transport.request_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
