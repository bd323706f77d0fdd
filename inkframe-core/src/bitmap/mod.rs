//! Streaming BMP decoder
//!
//! Supports the one container variant the frame server produces:
//! uncompressed BMP with a 40-byte info header, at 24 bits (BGR) or
//! 8 bits (indexed, 256-entry palette). Pixels are pulled row by row
//! straight from storage; only one row is ever held in RAM.

pub mod decoder;
pub mod header;

pub use decoder::{BitmapDecoder, DecodeError, Pixel, Pixels, DEFAULT_ROW_LIMIT};
pub use header::{BitDepth, BitmapHeader, FormatError, HEADER_LEN, PALETTE_OFFSET};
