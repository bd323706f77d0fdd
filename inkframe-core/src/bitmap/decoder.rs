//! Row-streaming pixel decoder

use alloc::vec::Vec;

use embedded_io::{Read, ReadExactError, Seek, SeekFrom};

use super::header::{
    BitDepth, BitmapHeader, FormatError, HEADER_LEN, PALETTE_ENTRIES, PALETTE_OFFSET,
};
use crate::color::Rgb;

/// Largest row buffer the decoder will ask for
///
/// A 600 px wide 24-bit row needs 1800 bytes; anything far beyond the
/// panel width is not worth the heap.
pub const DEFAULT_ROW_LIMIT: usize = 8 * 1024;

/// Decoding errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Header, palette or pixel data is malformed or short
    Format(FormatError),
    /// Row buffer could not be obtained
    Allocation,
    /// Underlying reader failed
    Io,
}

impl From<FormatError> for DecodeError {
    fn from(e: FormatError) -> Self {
        DecodeError::Format(e)
    }
}

impl<E> From<ReadExactError<E>> for DecodeError {
    fn from(e: ReadExactError<E>) -> Self {
        match e {
            ReadExactError::UnexpectedEof => DecodeError::Format(FormatError::Truncated),
            ReadExactError::Other(_) => DecodeError::Io,
        }
    }
}

/// A decoded pixel at display coordinates (row 0 = top)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pixel {
    pub row: u32,
    pub col: u32,
    pub rgb: Rgb,
}

/// Streaming decoder over a seekable source
///
/// Holds the parsed header, the palette for indexed images and a single
/// row buffer. Every row read seeks to the row's file offset first, so the
/// traversal order does not depend on how the file stores its rows.
pub struct BitmapDecoder<R> {
    source: R,
    header: BitmapHeader,
    palette: Option<[Rgb; PALETTE_ENTRIES]>,
    row: Vec<u8>,
    next_row: u32,
    next_col: u32,
}

impl<R: Read + Seek> BitmapDecoder<R> {
    /// Parse the header and allocate the row buffer
    pub fn new(source: R) -> Result<Self, DecodeError> {
        Self::with_row_limit(source, DEFAULT_ROW_LIMIT)
    }

    /// Like [`BitmapDecoder::new`] with an explicit row buffer budget
    ///
    /// Fails with [`DecodeError::Allocation`] if the row stride exceeds
    /// `row_limit` or the allocator cannot provide it.
    pub fn with_row_limit(mut source: R, row_limit: usize) -> Result<Self, DecodeError> {
        source.seek(SeekFrom::Start(0)).map_err(|_| DecodeError::Io)?;

        let mut raw = [0u8; HEADER_LEN];
        let len = read_up_to(&mut source, &mut raw)?;
        let header = BitmapHeader::parse(&raw[..len])?;

        let stride = header.stride();
        if stride > row_limit {
            return Err(DecodeError::Allocation);
        }
        let mut row = Vec::new();
        row.try_reserve_exact(stride)
            .map_err(|_| DecodeError::Allocation)?;
        row.resize(stride, 0);

        let palette = match header.depth {
            BitDepth::Indexed8 => Some(read_palette(&mut source)?),
            BitDepth::Bgr24 => None,
        };

        Ok(Self {
            source,
            header,
            palette,
            row,
            next_row: 0,
            next_col: 0,
        })
    }

    /// Parsed header
    pub fn header(&self) -> &BitmapHeader {
        &self.header
    }

    /// Restart pixel iteration at the top-left corner
    pub fn rewind(&mut self) {
        self.next_row = 0;
        self.next_col = 0;
    }

    /// Iterate all pixels from the top-left corner, row by row
    ///
    /// The iterator stops after the first error.
    pub fn pixels(&mut self) -> Pixels<'_, R> {
        self.rewind();
        Pixels { decoder: self }
    }

    /// Load display row `row` into the row buffer
    fn load_row(&mut self, row: u32) -> Result<(), DecodeError> {
        let offset = self.header.row_offset(row);
        self.source
            .seek(SeekFrom::Start(offset))
            .map_err(|_| DecodeError::Io)?;
        let len = self.header.row_bytes();
        self.source.read_exact(&mut self.row[..len])?;
        Ok(())
    }

    fn pixel_at(&self, col: u32) -> Rgb {
        let col = col as usize;
        match (self.header.depth, &self.palette) {
            (BitDepth::Indexed8, Some(palette)) => palette[self.row[col] as usize],
            (BitDepth::Indexed8, None) => Rgb::default(),
            (BitDepth::Bgr24, _) => {
                let at = col * 3;
                Rgb::from_bgr(self.row[at], self.row[at + 1], self.row[at + 2])
            }
        }
    }
}

/// Lazy pixel sequence produced by [`BitmapDecoder::pixels`]
pub struct Pixels<'a, R> {
    decoder: &'a mut BitmapDecoder<R>,
}

impl<R: Read + Seek> Iterator for Pixels<'_, R> {
    type Item = Result<Pixel, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let d = &mut *self.decoder;
        if d.next_row >= d.header.height {
            return None;
        }

        if d.next_col == 0 {
            if let Err(e) = d.load_row(d.next_row) {
                d.next_row = d.header.height;
                return Some(Err(e));
            }
        }

        let pixel = Pixel {
            row: d.next_row,
            col: d.next_col,
            rgb: d.pixel_at(d.next_col),
        };

        d.next_col += 1;
        if d.next_col >= d.header.width {
            d.next_col = 0;
            d.next_row += 1;
        }

        Some(Ok(pixel))
    }
}

/// Read until `buf` is full or the source is exhausted
fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize, DecodeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => return Err(DecodeError::Io),
        }
    }
    Ok(filled)
}

fn read_palette<R: Read + Seek>(source: &mut R) -> Result<[Rgb; PALETTE_ENTRIES], DecodeError> {
    source
        .seek(SeekFrom::Start(PALETTE_OFFSET))
        .map_err(|_| DecodeError::Io)?;

    let mut palette = [Rgb::default(); PALETTE_ENTRIES];
    let mut entry = [0u8; 4];
    for slot in palette.iter_mut() {
        source.read_exact(&mut entry)?;
        *slot = Rgb::from_bgr(entry[0], entry[1], entry[2]);
    }
    Ok(palette)
}
