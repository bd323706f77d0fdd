//! Color handling
//!
//! The panel can only show seven pigments. Every decoded pixel passes
//! through [`quantize`] on its way to the panel.

pub mod palette;

pub use palette::{quantize, DeviceColor, PaletteEntry, Rgb, PALETTE};
