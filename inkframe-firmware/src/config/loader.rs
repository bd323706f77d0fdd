//! Configuration persistence
//!
//! Loads the frame configuration saved in flash. The caller falls back to
//! the embedded `frame.toml` when nothing usable is stored.

use defmt::*;

use inkframe_core::config::{FrameConfig, ValidationError, CONFIG_VERSION};
use inkframe_hal_rp2040::flash::{FlashError, Rp2040ConfigStorage, StorageKey};
use inkframe_hal_rp2040::FlashStorageTrait;

use super::toml::{parse_config, ParseError};

/// Maximum serialized config size
const MAX_CONFIG_SIZE: usize = 1024;

/// Configuration loading errors
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Flash operation failed
    Flash(FlashError),
    /// Stored bytes are not a `FrameConfig`
    Deserialize,
    /// Embedded TOML did not parse
    Toml(ParseError),
    /// Configuration parsed but is unusable
    Invalid(ValidationError),
}

impl From<FlashError> for ConfigError {
    fn from(e: FlashError) -> Self {
        ConfigError::Flash(e)
    }
}

impl From<ValidationError> for ConfigError {
    fn from(e: ValidationError) -> Self {
        ConfigError::Invalid(e)
    }
}

/// Configuration persistence manager
pub struct ConfigPersistence<'d> {
    storage: Rp2040ConfigStorage<'d>,
}

impl<'d> ConfigPersistence<'d> {
    pub fn new(storage: Rp2040ConfigStorage<'d>) -> Self {
        Self { storage }
    }

    /// Give the storage back so the flash can be reused for the image cache
    pub fn into_storage(self) -> Rp2040ConfigStorage<'d> {
        self.storage
    }

    /// Load and validate the stored configuration
    pub async fn load(&mut self) -> Result<FrameConfig, ConfigError> {
        let mut buffer = [0u8; MAX_CONFIG_SIZE];
        let len = self
            .storage
            .read(StorageKey::FrameConfig, &mut buffer)
            .await?;

        debug!("Read {} bytes of config from flash", len);

        let config: FrameConfig =
            postcard::from_bytes(&buffer[..len]).map_err(|_| ConfigError::Deserialize)?;
        config.validate()?;

        log_config_summary(&config);
        Ok(config)
    }
}

/// Parse and validate the configuration compiled into the firmware
pub fn parse_embedded(text: &str) -> Result<FrameConfig, ConfigError> {
    let mut config = parse_config(text).map_err(ConfigError::Toml)?;
    config.version = CONFIG_VERSION;
    config.validate()?;
    log_config_summary(&config);
    Ok(config)
}

fn log_config_summary(config: &FrameConfig) {
    info!("Image URL: {}", config.image_url.as_str());
    debug!(
        "  update every {} s (auto: {}), failure after {} s, retry {} s",
        config.update_interval_s,
        config.auto_fetch,
        config.failure_threshold_s,
        config.failure_retry_s
    );
    debug!("  Wi-Fi SSID: {}", config.wifi.ssid.as_str());
    if config.mqtt.enabled {
        debug!(
            "  MQTT {}:{} base '{}'",
            config.mqtt.broker.as_str(),
            config.mqtt.port,
            config.mqtt.base_topic.as_str()
        );
    }
}
