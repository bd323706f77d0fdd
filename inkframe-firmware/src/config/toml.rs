//! Simple TOML parser for the frame configuration
//!
//! Handles only the subset `frame.toml` uses. It does NOT support the full
//! TOML spec.
//!
//! Supported:
//! - `key = value` pairs (string, integer, boolean)
//! - `[wifi]` and `[mqtt]` section headers
//! - Comments (`# ...`), including after a value
//!
//! NOT supported:
//! - Multi-line strings, escapes inside strings
//! - Arrays, inline tables, dotted keys

use heapless::String as HString;

use inkframe_core::config::FrameConfig;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Section other than `[wifi]` or `[mqtt]`
    InvalidSection,
    /// Key not valid in its section
    UnknownKey,
    /// Value has the wrong type or is out of range
    InvalidValue,
    /// String longer than its field allows
    TooLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Wifi,
    Mqtt,
}

/// Parse `frame.toml` text on top of the built-in defaults
pub fn parse_config(input: &str) -> Result<FrameConfig, ParseError> {
    let mut config = FrameConfig::default();
    let mut section = Section::Root;

    for line in input.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = match line[1..line.len() - 1].trim() {
                "wifi" => Section::Wifi,
                "mqtt" => Section::Mqtt,
                _ => return Err(ParseError::InvalidSection),
            };
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config)?;
        }
    }

    Ok(config)
}

fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Inline comment, unless the # sits inside a string
    let value = match value.find('#') {
        Some(hash_pos) if value[..hash_pos].matches('"').count() % 2 == 0 => {
            value[..hash_pos].trim()
        }
        _ => value,
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

fn parse_string(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_int<T: core::str::FromStr>(value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

fn parse_bool(value: &str) -> Result<bool, ParseError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::InvalidValue),
    }
}

fn set_string<const N: usize>(field: &mut HString<N>, value: &str) -> Result<(), ParseError> {
    field.clear();
    field
        .push_str(parse_string(value))
        .map_err(|_| ParseError::TooLong)
}

fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut FrameConfig,
) -> Result<(), ParseError> {
    match section {
        Section::Root => match key {
            "device_name" => set_string(&mut config.device_name, value),
            "image_url" => set_string(&mut config.image_url, value),
            "update_interval_s" => parse_int(value).map(|v| config.update_interval_s = v),
            "auto_fetch" => parse_bool(value).map(|v| config.auto_fetch = v),
            "failure_threshold_s" => parse_int(value).map(|v| config.failure_threshold_s = v),
            "failure_retry_s" => parse_int(value).map(|v| config.failure_retry_s = v),
            "network_retry_s" => parse_int(value).map(|v| config.network_retry_s = v),
            "remote_retry_s" => parse_int(value).map(|v| config.remote_retry_s = v),
            "http_timeout_s" => parse_int(value).map(|v| config.http_timeout_s = v),
            "battery_sleep_s" => parse_int(value).map(|v| config.battery_sleep_s = v),
            _ => Err(ParseError::UnknownKey),
        },
        Section::Wifi => match key {
            "ssid" => set_string(&mut config.wifi.ssid, value),
            "password" => set_string(&mut config.wifi.password, value),
            _ => Err(ParseError::UnknownKey),
        },
        Section::Mqtt => match key {
            "enabled" => parse_bool(value).map(|v| config.mqtt.enabled = v),
            "broker" => set_string(&mut config.mqtt.broker, value),
            "port" => parse_int(value).map(|v| config.mqtt.port = v),
            "username" => set_string(&mut config.mqtt.username, value),
            "password" => set_string(&mut config.mqtt.password, value),
            "base_topic" => set_string(&mut config.mqtt.base_topic, value),
            _ => Err(ParseError::UnknownKey),
        },
    }
}
