//! Paged panel trait for the e-paper display

use crate::color::DeviceColor;

/// Errors that can occur talking to the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanelError {
    /// SPI or GPIO transfer failed
    Bus,
    /// BUSY line never released
    Timeout,
    /// Page call out of sequence (e.g. `next_page` before `first_page`)
    Sequence,
}

/// Trait for panels refreshed through a page buffer
///
/// The controller RAM is filled one horizontal band at a time because the
/// MCU cannot hold a whole frame. A full refresh looks like:
///
/// ```text
/// first_page()
/// loop {
///     draw_pixel(..) for every pixel of the frame
///     if !next_page()? { break }
/// }
/// hibernate()
/// ```
///
/// Draws outside the current band are discarded by the implementation, so
/// callers can simply replay the whole frame for every page.
pub trait PagedPanel {
    /// Panel size in pixels (width, height)
    fn size(&self) -> (u16, u16);

    /// Start a new frame and prepare the first page buffer
    fn first_page(&mut self) -> Result<(), PanelError>;

    /// Set one pixel at absolute frame coordinates
    ///
    /// Coordinates outside the current page (or the panel) are ignored.
    fn draw_pixel(&mut self, x: i32, y: i32, color: DeviceColor);

    /// Commit the current page
    ///
    /// Returns `Ok(true)` while more pages remain; `Ok(false)` once the last
    /// page has been committed and the panel refreshed.
    fn next_page(&mut self) -> Result<bool, PanelError>;

    /// Put the panel into its lowest-power hold state
    fn hibernate(&mut self) -> Result<(), PanelError>;
}
