//! Configuration type definitions
//!
//! These types represent the frame configuration. The firmware builds one
//! from its embedded `frame.toml`; a copy saved in flash as
//! postcard-serialized binary data takes precedence.

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use inkframe_protocol::MAX_URL_LEN;

/// Config format version, bumped when the stored layout changes
pub const CONFIG_VERSION: u8 = 1;

/// Maximum device name length
pub const MAX_NAME_LEN: usize = 32;

/// Maximum Wi-Fi SSID length
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length (Wi-Fi and MQTT)
pub const MAX_SECRET_LEN: usize = 64;

/// Maximum broker host name length
pub const MAX_HOST_LEN: usize = 64;

/// Maximum MQTT base topic length
pub const MAX_BASE_TOPIC_LEN: usize = 48;

/// Wi-Fi credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WifiConfig {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_SECRET_LEN>,
}

/// MQTT remote channel
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MqttConfig {
    /// Disabled frames never try to reach a broker
    pub enabled: bool,
    /// Broker host name or dotted IPv4 address
    pub broker: String<MAX_HOST_LEN>,
    pub port: u16,
    /// Credentials are sent only when both are non-empty
    pub username: String<MAX_NAME_LEN>,
    pub password: String<MAX_SECRET_LEN>,
    /// Prefix for `command`, `status` and `availability`
    pub base_topic: String<MAX_BASE_TOPIC_LEN>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        let mut base_topic = String::new();
        let _ = base_topic.push_str("inkframe");
        Self {
            enabled: false,
            broker: String::new(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            base_topic,
        }
    }
}

/// Complete frame configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameConfig {
    /// Layout version of the stored copy
    pub version: u8,
    /// Device identifier used for MQTT client id and discovery
    pub device_name: String<MAX_NAME_LEN>,
    /// Where the server publishes the rendered bitmap
    pub image_url: String<MAX_URL_LEN>,
    /// Routine update interval (seconds)
    pub update_interval_s: u32,
    /// Fetch on the routine interval; otherwise only on command or retry
    pub auto_fetch: bool,
    /// Time without a successful update before failure mode (seconds)
    pub failure_threshold_s: u32,
    /// Retry interval while in failure mode (seconds)
    pub failure_retry_s: u32,
    /// Wi-Fi reconnect cadence (seconds)
    pub network_retry_s: u32,
    /// MQTT reconnect cadence (seconds)
    pub remote_retry_s: u32,
    /// Whole-request HTTP timeout (seconds)
    pub http_timeout_s: u32,
    /// Low-power wait between cycles in battery mode (seconds)
    pub battery_sleep_s: u32,
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
}

impl Default for FrameConfig {
    fn default() -> Self {
        let mut device_name = String::new();
        let _ = device_name.push_str("inkframe");
        Self {
            version: CONFIG_VERSION,
            device_name,
            image_url: String::new(),
            update_interval_s: 1800,
            auto_fetch: true,
            failure_threshold_s: 86_400,
            failure_retry_s: 3600,
            network_retry_s: 30,
            remote_retry_s: 60,
            http_timeout_s: 30,
            battery_sleep_s: 3600,
            wifi: WifiConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

/// Reasons a configuration is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationError {
    /// No image URL configured
    MissingImageUrl,
    /// Image URL is not `http://`
    UnsupportedScheme,
    /// A named interval is zero
    ZeroInterval(&'static str),
    /// MQTT enabled without a broker
    MissingBroker,
    /// Stored copy has a different layout version
    VersionMismatch(u8),
}

impl FrameConfig {
    /// Check the invariants the firmware relies on
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != CONFIG_VERSION {
            return Err(ValidationError::VersionMismatch(self.version));
        }
        if self.image_url.is_empty() {
            return Err(ValidationError::MissingImageUrl);
        }
        if !self.image_url.starts_with("http://") {
            return Err(ValidationError::UnsupportedScheme);
        }

        let intervals = [
            ("update_interval_s", self.update_interval_s),
            ("failure_threshold_s", self.failure_threshold_s),
            ("failure_retry_s", self.failure_retry_s),
            ("network_retry_s", self.network_retry_s),
            ("remote_retry_s", self.remote_retry_s),
            ("http_timeout_s", self.http_timeout_s),
            ("battery_sleep_s", self.battery_sleep_s),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ValidationError::ZeroInterval(*name));
        }

        if self.mqtt.enabled && self.mqtt.broker.is_empty() {
            return Err(ValidationError::MissingBroker);
        }
        Ok(())
    }
}

/// Seconds to milliseconds
pub const fn secs_to_ms(secs: u32) -> u64 {
    secs as u64 * 1000
}
