//! Inkframe storage abstraction layer
//!
//! Chip-independent storage for the frame: the keyed configuration store
//! trait and a single-slot image store over any NOR flash partition.
//! Chip-specific crates supply the flash driver.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  inkframe-firmware                      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  inkframe-hal (this crate)              │
//! │  FlashStorage, PartitionImageStore      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  inkframe-hal-rp2040 (embassy-rp flash) │
//! └─────────────────────────────────────────┘
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod flash;
pub mod image;

pub use flash::{FlashError, FlashStorage, StorageKey};
pub use image::{PartitionImageStore, PartitionReader};
