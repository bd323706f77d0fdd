//! RP2040 flash support for the picture frame
//!
//! Splits the on-board flash into an image partition and a configuration
//! partition and provides the storage drivers for both:
//!
//! - [`flash::Rp2040ConfigStorage`] implements `inkframe_hal::FlashStorage`
//! - [`flash::image_store`] builds the image cache over the image partition

#![no_std]

pub mod flash;

pub use inkframe_hal::{FlashStorage as FlashStorageTrait, StorageKey};
