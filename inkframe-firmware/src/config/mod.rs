//! Configuration loading and parsing
//!
//! A validated copy saved in flash wins; otherwise the embedded
//! `frame.toml` is parsed with a small no_std parser.

pub mod loader;
pub mod toml;

pub use loader::{parse_embedded, ConfigError, ConfigPersistence};
