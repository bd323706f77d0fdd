//! JSON payloads carried on the application topics

use core::fmt::Write;

use heapless::String;
use serde::{Deserialize, Serialize, Serializer};

use crate::topics::{Topic, Topics};
use crate::MAX_URL_LEN;

/// Body of the discovery update button press, also a valid command
pub const UPDATE_PAYLOAD: &str = r#"{"command":"update"}"#;

/// Availability payloads
pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Errors from message parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// Payload is not the expected JSON document
    InvalidJson,
    /// `command` value is not recognized
    UnknownCommand,
    /// `url` exceeds [`MAX_URL_LEN`]
    UrlTooLong,
    /// Output buffer too small
    BufferTooSmall,
    /// Composed topic or identifier too long
    TooLong,
}

/// Recognized remote commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    /// Fetch and draw now
    Update,
}

/// A command received on `<base>/command`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub kind: CommandKind,
    /// Replacement image URL, if the command carried one
    pub url: Option<String<MAX_URL_LEN>>,
}

#[derive(Deserialize)]
struct CommandDoc<'a> {
    command: &'a str,
    #[serde(default, borrow)]
    url: Option<&'a str>,
}

impl RemoteCommand {
    /// Parse `{"command":"update","url":"..."}`
    ///
    /// An empty `url` is treated as absent.
    pub fn parse(payload: &[u8]) -> Result<Self, MessageError> {
        let (doc, _) = serde_json_core::from_slice::<CommandDoc<'_>>(payload)
            .map_err(|_| MessageError::InvalidJson)?;

        let kind = match doc.command {
            "update" => CommandKind::Update,
            _ => return Err(MessageError::UnknownCommand),
        };

        let url = match doc.url {
            Some(url) if !url.is_empty() => {
                let mut owned = String::new();
                owned.push_str(url).map_err(|_| MessageError::UrlTooLong)?;
                Some(owned)
            }
            _ => None,
        };

        Ok(Self { kind, url })
    }
}

/// Boolean as Home Assistant's `ON`/`OFF`
pub fn failure_flag(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

fn on_off<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(failure_flag(*value))
}

/// Status snapshot published on `<base>/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport<'a> {
    /// Dotted IPv4 address, empty while unassigned
    pub ip: &'a str,
    /// Wi-Fi signal in dBm
    pub rssi: i16,
    /// Human-readable status text
    pub status: &'a str,
    /// Seconds since the last successful update
    pub since_success_s: u64,
    #[serde(serialize_with = "on_off")]
    pub failure_mode: bool,
}

impl StatusReport<'_> {
    /// Serialize into `buffer`, returning the JSON length
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, MessageError> {
        serde_json_core::to_slice(self, buffer).map_err(|_| MessageError::BufferTooSmall)
    }
}

/// Entities registered through Home Assistant discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Entity {
    /// Status text sensor
    Status,
    /// Failure-mode binary sensor
    FailureMode,
    /// Force-update button
    Update,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Status, Entity::FailureMode, Entity::Update];

    pub fn component(self) -> &'static str {
        match self {
            Entity::Status => "sensor",
            Entity::FailureMode => "binary_sensor",
            Entity::Update => "button",
        }
    }

    pub fn object_id(self) -> &'static str {
        match self {
            Entity::Status => "status",
            Entity::FailureMode => "failure_mode",
            Entity::Update => "update",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Entity::Status => "Status",
            Entity::FailureMode => "Failure mode",
            Entity::Update => "Update now",
        }
    }
}

#[derive(Serialize)]
struct DeviceDoc<'a> {
    identifiers: [&'a str; 1],
    name: &'a str,
    model: &'a str,
}

#[derive(Serialize)]
struct DiscoveryDoc<'a> {
    name: &'a str,
    unique_id: &'a str,
    availability_topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_template: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_on: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_off: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_press: Option<&'a str>,
    device: DeviceDoc<'a>,
}

/// Serialize the retained discovery record for `entity`
pub fn discovery_config(
    entity: Entity,
    topics: &Topics<'_>,
    device_name: &str,
    buffer: &mut [u8],
) -> Result<usize, MessageError> {
    let status = topics.topic(Topic::Status)?;
    let command = topics.topic(Topic::Command)?;
    let availability = topics.topic(Topic::Availability)?;

    let mut unique_id: String<64> = String::new();
    write!(unique_id, "{}_{}", topics.device_id(), entity.object_id())
        .map_err(|_| MessageError::TooLong)?;

    let mut doc = DiscoveryDoc {
        name: entity.display_name(),
        unique_id: &unique_id,
        availability_topic: &availability,
        state_topic: None,
        value_template: None,
        payload_on: None,
        payload_off: None,
        command_topic: None,
        payload_press: None,
        device: DeviceDoc {
            identifiers: [topics.device_id()],
            name: device_name,
            model: "ACeP 5.65in 7-color frame",
        },
    };

    match entity {
        Entity::Status => {
            doc.state_topic = Some(&status);
            doc.value_template = Some("{{ value_json.status }}");
        }
        Entity::FailureMode => {
            doc.state_topic = Some(&status);
            doc.value_template = Some("{{ value_json.failure_mode }}");
            doc.payload_on = Some(failure_flag(true));
            doc.payload_off = Some(failure_flag(false));
        }
        Entity::Update => {
            doc.command_topic = Some(&command);
            doc.payload_press = Some(UPDATE_PAYLOAD);
        }
    }

    serde_json_core::to_slice(&doc, buffer).map_err(|_| MessageError::BufferTooSmall)
}
