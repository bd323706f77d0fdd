//! Frame Control Channel Protocol
//!
//! This crate defines the wire formats the frame speaks: the MQTT-based
//! channel to a home automation broker, and the plain HTTP request used to
//! fetch the image. The frame is a plain MQTT 3.1.1 client using QoS 0
//! only, so the packet codec covers exactly the packets it sends and
//! receives.
//!
//! # Protocol Overview
//!
//! All packets share the MQTT fixed header:
//! ```text
//! ┌─────────────┬──────────────────┬───────────────────────────┐
//! │ TYPE|FLAGS  │ REMAINING LENGTH │ VARIABLE HEADER + PAYLOAD │
//! │ 1B          │ 1–4B (varint)    │ 0–N B                     │
//! └─────────────┴──────────────────┴───────────────────────────┘
//! ```
//!
//! Payloads on the application topics are small JSON documents:
//!
//! - `<base>/command`: `{"command":"update","url":"http://..."}`
//! - `<base>/status` (retained): device address, signal, status text,
//!   seconds since the last good update and the failure-mode flag
//! - `homeassistant/<component>/<device>/<object>/config` (retained):
//!   discovery records for the status sensor, the failure-mode binary
//!   sensor and the update button

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod frame;
pub mod http;
pub mod messages;
pub mod topics;

pub use frame::{
    encode_connect, encode_disconnect, encode_pingreq, encode_publish, encode_subscribe, Connect,
    FrameError, Incoming, PacketParser, Publish, Will, MAX_BODY_SIZE, MAX_INBOUND_PAYLOAD,
};
pub use http::{encode_get, HttpError, ResponseHead, Url};
pub use messages::{
    discovery_config, failure_flag, CommandKind, Entity, MessageError, RemoteCommand, StatusReport,
};
pub use topics::{Topic, Topics};

/// Longest image URL accepted from configuration or a remote command
pub const MAX_URL_LEN: usize = 256;

/// Longest topic the frame builds or accepts
pub const MAX_TOPIC_LEN: usize = 128;
