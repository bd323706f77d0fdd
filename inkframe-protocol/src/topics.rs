//! Topic names for one frame

use core::fmt::Write;

use heapless::String;

use crate::messages::{Entity, MessageError};
use crate::MAX_TOPIC_LEN;

/// Home Assistant discovery prefix
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Application topics below the configured base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Topic {
    /// Inbound remote commands
    Command,
    /// Retained status snapshots
    Status,
    /// Retained "online"/"offline", the latter set as last will
    Availability,
}

impl Topic {
    /// Path segment after the base topic
    pub fn suffix(self) -> &'static str {
        match self {
            Topic::Command => "command",
            Topic::Status => "status",
            Topic::Availability => "availability",
        }
    }
}

/// Topic builder for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topics<'a> {
    base: &'a str,
    device_id: &'a str,
}

impl<'a> Topics<'a> {
    pub fn new(base: &'a str, device_id: &'a str) -> Self {
        Self { base, device_id }
    }

    pub fn device_id(&self) -> &'a str {
        self.device_id
    }

    /// `<base>/<suffix>`
    pub fn topic(&self, topic: Topic) -> Result<String<MAX_TOPIC_LEN>, MessageError> {
        let mut out = String::new();
        write!(out, "{}/{}", self.base, topic.suffix()).map_err(|_| MessageError::TooLong)?;
        Ok(out)
    }

    /// `homeassistant/<component>/<device>/<object>/config`
    pub fn discovery(&self, entity: Entity) -> Result<String<MAX_TOPIC_LEN>, MessageError> {
        let mut out = String::new();
        write!(
            out,
            "{}/{}/{}/{}/config",
            DISCOVERY_PREFIX,
            entity.component(),
            self.device_id,
            entity.object_id()
        )
        .map_err(|_| MessageError::TooLong)?;
        Ok(out)
    }

    /// Check whether an inbound topic is this frame's command topic
    pub fn is_command(&self, topic: &str) -> bool {
        topic
            .strip_prefix(self.base)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| rest == Topic::Command.suffix())
    }
}
