//! BMP header parsing
//!
//! Layout of the fields we read (all little-endian):
//!
//! ```text
//! offset  size  field
//! 0       2     signature "BM"
//! 10      4     pixel data offset (u32)
//! 18      4     width  (i32)
//! 22      4     height (i32, negative = rows stored top-down)
//! 28      2     bits per pixel (u16)
//! 54      1024  palette, 8-bit images only (B, G, R, reserved) x 256
//! ```

/// Expected signature at offset 0
pub const SIGNATURE: [u8; 2] = *b"BM";

/// File header (14) + BITMAPINFOHEADER (40)
pub const HEADER_LEN: usize = 54;

/// Palette location for indexed images
pub const PALETTE_OFFSET: u64 = HEADER_LEN as u64;

/// Number of palette entries for 8-bit images
pub const PALETTE_ENTRIES: usize = 256;

const PIXEL_OFFSET_AT: usize = 10;
const WIDTH_AT: usize = 18;
const HEIGHT_AT: usize = 22;
const DEPTH_AT: usize = 28;

/// Header validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatError {
    /// Signature is not "BM"
    BadSignature,
    /// File ended before the header, palette or a pixel row was complete
    Truncated,
    /// Zero or negative width, zero height, or sizes that overflow
    BadGeometry,
    /// Bits per pixel other than 8 or 24
    UnsupportedDepth(u16),
}

/// Supported pixel encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitDepth {
    /// One palette index per pixel
    Indexed8,
    /// Blue, green, red bytes per pixel
    Bgr24,
}

impl BitDepth {
    /// Bits per pixel
    pub const fn bits(self) -> u16 {
        match self {
            BitDepth::Indexed8 => 8,
            BitDepth::Bgr24 => 24,
        }
    }

    /// Bytes per pixel
    pub const fn bytes(self) -> usize {
        match self {
            BitDepth::Indexed8 => 1,
            BitDepth::Bgr24 => 3,
        }
    }

    fn from_bits(bits: u16) -> Result<Self, FormatError> {
        match bits {
            8 => Ok(BitDepth::Indexed8),
            24 => Ok(BitDepth::Bgr24),
            other => Err(FormatError::UnsupportedDepth(other)),
        }
    }
}

/// Parsed BMP geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitmapHeader {
    /// File offset of the first stored pixel row
    pub pixel_offset: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels (magnitude of the stored value)
    pub height: u32,
    /// Rows are stored bottom row first (positive stored height)
    pub bottom_up: bool,
    /// Pixel encoding
    pub depth: BitDepth,
    stride: usize,
}

impl BitmapHeader {
    /// Parse the first [`HEADER_LEN`] bytes of a bitmap
    ///
    /// Input shorter than a full header is rejected before any geometry
    /// field is read.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < SIGNATURE.len() {
            return Err(FormatError::Truncated);
        }
        if bytes[..2] != SIGNATURE {
            return Err(FormatError::BadSignature);
        }
        if bytes.len() < HEADER_LEN {
            return Err(FormatError::Truncated);
        }

        let pixel_offset = read_u32(bytes, PIXEL_OFFSET_AT)?;
        let raw_width = read_i32(bytes, WIDTH_AT)?;
        let raw_height = read_i32(bytes, HEIGHT_AT)?;
        let depth = BitDepth::from_bits(read_u16(bytes, DEPTH_AT)?)?;

        if raw_width <= 0 || raw_height == 0 {
            return Err(FormatError::BadGeometry);
        }
        let width = raw_width as u32;
        let height = raw_height.unsigned_abs();

        // ((width * bits / 8) + 3) & !3
        let row_bytes = (width as u64 * depth.bits() as u64) / 8;
        let stride = (row_bytes + 3) & !3;

        // Last row must be addressable without overflow
        stride
            .checked_mul(height as u64)
            .and_then(|len| len.checked_add(pixel_offset as u64))
            .ok_or(FormatError::BadGeometry)?;
        let stride = usize::try_from(stride).map_err(|_| FormatError::BadGeometry)?;

        Ok(Self {
            pixel_offset,
            width,
            height,
            bottom_up: raw_height > 0,
            depth,
            stride,
        })
    }

    /// Bytes per stored row, including padding to a 4-byte boundary
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes of pixel data per row, excluding padding
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.depth.bytes()
    }

    /// File offset of display row `row` (0 = top of the image)
    pub fn row_offset(&self, row: u32) -> u64 {
        let stored = if self.bottom_up {
            self.height - 1 - row
        } else {
            row
        };
        self.pixel_offset as u64 + self.stride as u64 * stored as u64
    }
}

fn field<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N], FormatError> {
    bytes
        .get(at..at + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(FormatError::Truncated)
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, FormatError> {
    field(bytes, at).map(u16::from_le_bytes)
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, FormatError> {
    field(bytes, at).map(u32::from_le_bytes)
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32, FormatError> {
    field(bytes, at).map(i32::from_le_bytes)
}
