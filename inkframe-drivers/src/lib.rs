//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in inkframe-core:
//!
//! - 5.65" 7-color ACeP e-paper panel (600x448) over SPI, paged

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod epd;
