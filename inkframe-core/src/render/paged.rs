//! Bitmap to panel

use embedded_io::{Read, Seek};

use crate::bitmap::{BitmapDecoder, DecodeError};
use crate::color::quantize;
use crate::traits::{ImageStore, PagedPanel, PanelError, StorageError};

/// Rendering failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RenderError {
    /// Cached image could not be opened
    Storage(StorageError),
    /// Cached image is not a usable bitmap
    Decode(DecodeError),
    /// Panel did not respond
    Panel(PanelError),
}

impl From<StorageError> for RenderError {
    fn from(e: StorageError) -> Self {
        RenderError::Storage(e)
    }
}

impl From<DecodeError> for RenderError {
    fn from(e: DecodeError) -> Self {
        RenderError::Decode(e)
    }
}

impl From<PanelError> for RenderError {
    fn from(e: PanelError) -> Self {
        RenderError::Panel(e)
    }
}

/// Draw a decoded bitmap, one full decode pass per panel page
///
/// The panel is hibernated after the last page, and also after a failure
/// once paging has started. Returns the number of pages committed.
pub fn render_bitmap<R, P>(
    decoder: &mut BitmapDecoder<R>,
    panel: &mut P,
) -> Result<u32, RenderError>
where
    R: Read + Seek,
    P: PagedPanel,
{
    panel.first_page()?;

    match draw_pages(decoder, panel) {
        Ok(pages) => {
            panel.hibernate()?;
            Ok(pages)
        }
        Err(e) => {
            // Panel state is already an error; the hibernate result adds nothing
            let _ = panel.hibernate();
            Err(e)
        }
    }
}

fn draw_pages<R, P>(decoder: &mut BitmapDecoder<R>, panel: &mut P) -> Result<u32, RenderError>
where
    R: Read + Seek,
    P: PagedPanel,
{
    let mut pages = 0;
    loop {
        for pixel in decoder.pixels() {
            let pixel = pixel?;
            panel.draw_pixel(pixel.col as i32, pixel.row as i32, quantize(pixel.rgb));
        }
        pages += 1;
        if !panel.next_page()? {
            return Ok(pages);
        }
    }
}

/// Open the cached image and draw it
///
/// Header, palette and row-buffer problems are reported before the panel is
/// touched, so the previous picture stays up.
pub fn render_cached_image<S, P>(store: &mut S, panel: &mut P) -> Result<u32, RenderError>
where
    S: ImageStore,
    P: PagedPanel,
{
    let reader = store.open()?;
    let mut decoder = BitmapDecoder::new(reader)?;
    render_bitmap(&mut decoder, panel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::FormatError;
    use crate::color::DeviceColor;
    use crate::mock::{bmp24, bmp8, MemReader, MemoryStore, RecordingPanel};

    fn stripes(row: u32, _col: u32) -> (u8, u8, u8) {
        match row % 3 {
            0 => (250, 5, 5),
            1 => (0, 0, 0),
            _ => (255, 255, 0),
        }
    }

    #[test]
    fn test_every_band_is_filled() {
        let file = bmp24(12, 10, stripes);
        let mut decoder = BitmapDecoder::new(MemReader::new(&file)).unwrap();
        let mut panel = RecordingPanel::new(12, 10, 4);

        let pages = render_bitmap(&mut decoder, &mut panel).unwrap();

        assert_eq!(pages, 3);
        assert_eq!(panel.hibernations, 1);
        for y in 0..10u16 {
            let expected = match y % 3 {
                0 => DeviceColor::Red,
                1 => DeviceColor::Black,
                _ => DeviceColor::Yellow,
            };
            for x in 0..12u16 {
                assert_eq!(panel.at(x, y), Some(expected));
            }
        }
    }

    #[test]
    fn test_smaller_image_leaves_rest_undrawn() {
        let file = bmp24(4, 4, |_, _| (255, 255, 255));
        let mut decoder = BitmapDecoder::new(MemReader::new(&file)).unwrap();
        let mut panel = RecordingPanel::new(8, 8, 2);

        render_bitmap(&mut decoder, &mut panel).unwrap();

        assert_eq!(panel.count(DeviceColor::White), 16);
        assert_eq!(panel.at(5, 5), None);
    }

    #[test]
    fn test_larger_image_is_clipped() {
        let file = bmp24(20, 20, |_, _| (0, 0, 255));
        let mut decoder = BitmapDecoder::new(MemReader::new(&file)).unwrap();
        let mut panel = RecordingPanel::new(8, 6, 3);

        render_bitmap(&mut decoder, &mut panel).unwrap();

        assert_eq!(panel.count(DeviceColor::Blue), 48);
    }

    #[test]
    fn test_indexed_image() {
        let mut palette = [(0u8, 0u8, 0u8); 256];
        palette[1] = (0, 128, 255); // orange, stored B, G, R
        let file = bmp8(3, 3, &palette, |row, _| if row == 1 { 1 } else { 0 });
        let mut store = MemoryStore::with_image(&file);
        let mut panel = RecordingPanel::new(3, 3, 1);

        let pages = render_cached_image(&mut store, &mut panel).unwrap();

        assert_eq!(pages, 3);
        assert_eq!(panel.at(0, 1), Some(DeviceColor::Orange));
        assert_eq!(panel.at(0, 0), Some(DeviceColor::Black));
    }

    #[test]
    fn test_missing_image_never_touches_panel() {
        let mut store = MemoryStore::new(1024);
        let mut panel = RecordingPanel::new(4, 4, 2);

        let err = render_cached_image(&mut store, &mut panel).unwrap_err();

        assert_eq!(err, RenderError::Storage(StorageError::NoImage));
        assert_eq!(panel.pages_committed, 0);
        assert_eq!(panel.hibernations, 0);
    }

    #[test]
    fn test_bad_header_never_touches_panel() {
        let mut file = bmp24(4, 4, |_, _| (0, 0, 0));
        file[0] = b'X';
        let mut store = MemoryStore::with_image(&file);
        let mut panel = RecordingPanel::new(4, 4, 2);

        let err = render_cached_image(&mut store, &mut panel).unwrap_err();

        assert_eq!(err, RenderError::Decode(DecodeError::Format(FormatError::BadSignature)));
        assert_eq!(panel.pages_committed, 0);
    }

    #[test]
    fn test_truncated_rows_abort_and_hibernate() {
        let mut file = bmp24(4, 4, |_, _| (0, 0, 0));
        file.truncate(54 + 16 * 2);
        let mut store = MemoryStore::with_image(&file);
        let mut panel = RecordingPanel::new(4, 4, 2);

        let err = render_cached_image(&mut store, &mut panel).unwrap_err();

        assert_eq!(err, RenderError::Decode(DecodeError::Format(FormatError::Truncated)));
        assert_eq!(panel.pages_committed, 0);
        assert_eq!(panel.hibernations, 1);
    }

    #[test]
    fn test_panel_failure_is_reported() {
        let file = bmp24(4, 4, |_, _| (0, 0, 0));
        let mut store = MemoryStore::with_image(&file);
        let mut panel = RecordingPanel::new(4, 4, 2);
        panel.fail_on_page = Some(1);

        let err = render_cached_image(&mut store, &mut panel).unwrap_err();

        assert_eq!(err, RenderError::Panel(PanelError::Bus));
        assert_eq!(panel.pages_committed, 1);
    }
}
