//! Runtime tunables for the link supervisor.

use crate::constants::{
    DEFAULT_BAUDRATE, HANDSHAKE_SETTLE, HANDSHAKE_TIMEOUT, LEGACY_BAUDRATE, POLL_INTERVAL, PORT_DESCRIPTION,
    RECONFIGURE_DELAY, RETRY_DELAY, TICK_INTERVAL,
};
use crate::error::LinkError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What to do with inbound frames whose checksum does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    /// Drop the frame
    #[default]
    Strict,
    /// Log and process it anyway
    Advisory,
}

/// Supervisor configuration. Every field has a default, so a partial JSON
/// document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Port description to look for during discovery
    pub port_description: String,
    pub baud_rate: u32,
    pub legacy_baud_rate: u32,
    #[serde(with = "millis")]
    pub tick_interval: Duration,
    /// How long to wait for the first byte of the handshake reply
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,
    /// Extra wait once the reply started arriving
    #[serde(with = "millis")]
    pub handshake_settle: Duration,
    /// Pause between the default-rate and the legacy-rate attempt
    #[serde(with = "millis")]
    pub retry_delay: Duration,
    /// Gap between set-config and reset when reconfiguring the chip
    #[serde(with = "millis")]
    pub reconfigure_delay: Duration,
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    pub checksum_policy: ChecksumPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_description: PORT_DESCRIPTION.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            legacy_baud_rate: LEGACY_BAUDRATE,
            tick_interval: TICK_INTERVAL,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            handshake_settle: HANDSHAKE_SETTLE,
            retry_delay: RETRY_DELAY,
            reconfigure_delay: RECONFIGURE_DELAY,
            poll_interval: POLL_INTERVAL,
            checksum_policy: ChecksumPolicy::default(),
        }
    }
}

impl LinkConfig {
    pub fn from_json(json: &str) -> Result<Self, LinkError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn with_port_description(mut self, description: impl Into<String>) -> Self {
        self.port_description = description.into();
        self
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
