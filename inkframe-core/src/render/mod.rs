//! Paged rendering
//!
//! Both the cached bitmap and the failure screen are drawn by replaying the
//! whole frame once per panel page. Only one decoded row and the panel's
//! page buffer are ever held in memory.

pub mod failure;
pub mod paged;

pub use failure::{render_failure_screen, PanelCanvas};
pub use paged::{render_bitmap, render_cached_image, RenderError};
