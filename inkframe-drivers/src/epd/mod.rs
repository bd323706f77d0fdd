//! E-paper panels

pub mod acep565;

pub use acep565::{Acep565, HEIGHT, PAGE_ROWS, WIDTH};
