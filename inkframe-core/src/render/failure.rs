//! Built-in failure screen
//!
//! Shown when no image has been drawn for longer than the failure
//! threshold. Uses only fonts compiled into the firmware, so it works with
//! no network and a corrupt image cache.

use core::convert::Infallible;
use core::fmt::Write;

use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Alignment, Text};
use heapless::String;

use crate::color::{quantize, Rgb};
use crate::traits::{PagedPanel, PanelError};

const TITLE: &str = "NO NEW PICTURE";
const HINT: &str = "Check Wi-Fi and the image server";
const BORDER: u32 = 6;

/// `embedded-graphics` draw target over a paged panel
///
/// Colors are quantized to the device palette; draws outside the panel's
/// current page are dropped by the panel.
pub struct PanelCanvas<'a, P> {
    panel: &'a mut P,
}

impl<'a, P: PagedPanel> PanelCanvas<'a, P> {
    pub fn new(panel: &'a mut P) -> Self {
        Self { panel }
    }
}

impl<P: PagedPanel> OriginDimensions for PanelCanvas<'_, P> {
    fn size(&self) -> Size {
        let (w, h) = self.panel.size();
        Size::new(w as u32, h as u32)
    }
}

impl<P: PagedPanel> DrawTarget for PanelCanvas<'_, P> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let device = quantize(Rgb::new(color.r(), color.g(), color.b()));
            self.panel.draw_pixel(point.x, point.y, device);
        }
        Ok(())
    }
}

/// Draw one full frame of the failure screen
fn draw_screen<D>(target: &mut D, hours_since_success: u32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888> + OriginDimensions,
{
    let size = target.size();
    let center = Point::new(size.width as i32 / 2, size.height as i32 / 2);

    target.clear(Rgb888::WHITE)?;

    Rectangle::new(Point::zero(), size)
        .into_styled(PrimitiveStyle::with_stroke(Rgb888::RED, BORDER))
        .draw(target)?;

    let title = MonoTextStyle::new(&FONT_10X20, Rgb888::RED);
    Text::with_alignment(TITLE, center - Point::new(0, 30), title, Alignment::Center).draw(target)?;

    let mut line: String<40> = String::new();
    // Cannot overflow: the longest u32 renders well within capacity
    let _ = write!(line, "Last update {} h ago", hours_since_success);
    let body = MonoTextStyle::new(&FONT_10X20, Rgb888::BLACK);
    Text::with_alignment(&line, center, body, Alignment::Center).draw(target)?;

    let hint = MonoTextStyle::new(&FONT_6X10, Rgb888::BLACK);
    Text::with_alignment(HINT, center + Point::new(0, 30), hint, Alignment::Center).draw(target)?;

    Ok(())
}

/// Render the failure screen on every page, then hibernate the panel
pub fn render_failure_screen<P: PagedPanel>(
    panel: &mut P,
    hours_since_success: u32,
) -> Result<(), PanelError> {
    panel.first_page()?;
    loop {
        let mut canvas = PanelCanvas::new(&mut *panel);
        match draw_screen(&mut canvas, hours_since_success) {
            Ok(()) => {}
            Err(never) => match never {},
        }
        if !panel.next_page()? {
            break;
        }
    }
    panel.hibernate()
}
