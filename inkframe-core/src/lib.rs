//! Board-agnostic core logic for the e-paper picture frame firmware
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Hardware and collaborator abstraction traits (panel, image store, HTTP)
//! - Nearest-color quantization to the 7-color device palette
//! - Streaming BMP decoder that holds a single row in memory
//! - Paged renderer for the bitmap and the failure screen
//! - Image acquisition into the cached image slot
//! - Update/failure state machine
//! - Configuration type definitions

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod acquire;
pub mod bitmap;
pub mod color;
pub mod config;
pub mod render;
pub mod state;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
