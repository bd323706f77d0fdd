//! Build script for inkframe-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates frame.toml at compile time
//! - Checks that the CYW43439 radio firmware blobs are present

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Keys the firmware parser understands, per section
const ROOT_KEYS: &[&str] = &[
    "device_name",
    "image_url",
    "update_interval_s",
    "auto_fetch",
    "failure_threshold_s",
    "failure_retry_s",
    "network_retry_s",
    "remote_retry_s",
    "http_timeout_s",
    "battery_sleep_s",
];
const WIFI_KEYS: &[&str] = &["ssid", "password"];
const MQTT_KEYS: &[&str] = &["enabled", "broker", "port", "username", "password", "base_topic"];

const INTERVAL_KEYS: &[&str] = &[
    "update_interval_s",
    "failure_threshold_s",
    "failure_retry_s",
    "network_retry_s",
    "remote_retry_s",
    "http_timeout_s",
    "battery_sleep_s",
];

fn main() {
    setup_linker();
    validate_config();
    check_radio_firmware();
}

/// Radio firmware files embedded with `include_bytes!`
const RADIO_BLOBS: &[&str] = &["cyw43-firmware/43439A0.bin", "cyw43-firmware/43439A0_clm.bin"];

/// Fail early with a readable message when the radio blobs are missing
fn check_radio_firmware() {
    for blob in RADIO_BLOBS {
        println!("cargo:rerun-if-changed={}", blob);
        if !Path::new(blob).exists() {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: CYW43439 firmware not found                              ║\n\
                ║                                                                  ║\n\
                ║  Missing: {:<55}║\n\
                ║                                                                  ║\n\
                ║  Copy 43439A0.bin and 43439A0_clm.bin from the cyw43-firmware    ║\n\
                ║  directory of the embassy repository into                        ║\n\
                ║  inkframe-firmware/cyw43-firmware/.                              ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                blob
            );
        }
    }
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate frame.toml at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=frame.toml");

    let config_path = Path::new("frame.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: frame.toml not found!                                    ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds frame.toml as its default configuration.    ║\n\
            ║  Please create one in the inkframe-firmware directory.           ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read frame.toml                                ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in frame.toml                        ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();
    validate_keys(&config, &mut errors);
    validate_values(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid frame configuration                              ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=frame.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reject keys and sections the on-device parser would refuse
fn validate_keys(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(root) = config.as_table() else {
        errors.push("frame.toml must be a table".to_string());
        return;
    };

    for (key, value) in root {
        match (key.as_str(), value) {
            ("wifi", toml::Value::Table(t)) => check_section("wifi", t, WIFI_KEYS, errors),
            ("mqtt", toml::Value::Table(t)) => check_section("mqtt", t, MQTT_KEYS, errors),
            (k, _) if ROOT_KEYS.contains(&k) => {}
            (k, _) => errors.push(format!("unknown key '{}'", k)),
        }
    }
}

fn check_section(name: &str, table: &toml::Table, known: &[&str], errors: &mut Vec<String>) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            errors.push(format!("[{}] unknown key '{}'", name, key));
        }
    }
}

/// Check the values the frame cannot run without
fn validate_values(config: &toml::Value, errors: &mut Vec<String>) {
    match config.get("image_url") {
        Some(toml::Value::String(url)) if url.starts_with("http://") => {
            if url.len() > 256 {
                errors.push("image_url is longer than 256 bytes".to_string());
            }
        }
        Some(toml::Value::String(_)) => {
            errors.push("image_url must start with http://".to_string())
        }
        _ => errors.push("missing 'image_url'".to_string()),
    }

    for key in INTERVAL_KEYS {
        match config.get(*key) {
            None => {}
            Some(toml::Value::Integer(v)) if *v > 0 && *v <= u32::MAX as i64 => {}
            Some(_) => errors.push(format!("'{}' must be a positive integer", key)),
        }
    }

    match config.get("wifi").and_then(|w| w.get("ssid")) {
        Some(toml::Value::String(ssid)) if !ssid.is_empty() && ssid.len() <= 32 => {}
        _ => errors.push("[wifi] 'ssid' must be 1-32 characters".to_string()),
    }

    let Some(mqtt) = config.get("mqtt") else {
        return;
    };
    let enabled = matches!(mqtt.get("enabled"), Some(toml::Value::Boolean(true)));
    if enabled && !matches!(mqtt.get("broker"), Some(toml::Value::String(b)) if !b.is_empty()) {
        errors.push("[mqtt] enabled without a 'broker'".to_string());
    }
    if let Some(toml::Value::Integer(port)) = mqtt.get("port") {
        if *port <= 0 || *port > u16::MAX as i64 {
            errors.push("[mqtt] port must be 1-65535".to_string());
        }
    }
}
