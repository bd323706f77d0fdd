//! Device palette and nearest-color quantizer
//!
//! The ACeP panel accepts a 3-bit color code per pixel. The reference RGB
//! values below are what the off-device renderer dithers against, so a
//! pre-dithered image maps back onto the exact pigments.

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Create a color from red, green and blue components
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from bytes stored in blue-green-red order
    pub const fn from_bgr(b: u8, g: u8, r: u8) -> Self {
        Self { r, g, b }
    }
}

/// Colors the panel can physically render
///
/// The discriminant is the controller's color code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceColor {
    Black = 0,
    White = 1,
    Green = 2,
    Blue = 3,
    Red = 4,
    Yellow = 5,
    Orange = 6,
}

impl DeviceColor {
    /// Controller color code (low nibble of a pixel byte)
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a color by controller code
    pub fn from_code(code: u8) -> Option<Self> {
        PALETTE.get(code as usize).map(|entry| entry.color)
    }

    /// Reference RGB value for this pigment
    pub const fn rgb(self) -> Rgb {
        PALETTE[self as usize].rgb
    }

    /// Human readable name
    pub const fn name(self) -> &'static str {
        match self {
            DeviceColor::Black => "black",
            DeviceColor::White => "white",
            DeviceColor::Green => "green",
            DeviceColor::Blue => "blue",
            DeviceColor::Red => "red",
            DeviceColor::Yellow => "yellow",
            DeviceColor::Orange => "orange",
        }
    }
}

/// One palette slot: reference color plus the code sent to the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PaletteEntry {
    pub color: DeviceColor,
    pub rgb: Rgb,
}

/// The device palette, in tie-break order
///
/// Order matters: when two entries are equally close, the earlier one wins.
pub const PALETTE: [PaletteEntry; 7] = [
    PaletteEntry {
        color: DeviceColor::Black,
        rgb: Rgb::new(0, 0, 0),
    },
    PaletteEntry {
        color: DeviceColor::White,
        rgb: Rgb::new(255, 255, 255),
    },
    PaletteEntry {
        color: DeviceColor::Green,
        rgb: Rgb::new(0, 255, 0),
    },
    PaletteEntry {
        color: DeviceColor::Blue,
        rgb: Rgb::new(0, 0, 255),
    },
    PaletteEntry {
        color: DeviceColor::Red,
        rgb: Rgb::new(255, 0, 0),
    },
    PaletteEntry {
        color: DeviceColor::Yellow,
        rgb: Rgb::new(255, 255, 0),
    },
    PaletteEntry {
        color: DeviceColor::Orange,
        rgb: Rgb::new(255, 128, 0),
    },
];

/// Map a color to the closest palette entry
///
/// Distance is squared Euclidean in RGB space. Only a strictly smaller
/// distance replaces the current best, so ties go to the lower index.
pub fn quantize(rgb: Rgb) -> DeviceColor {
    let mut best = PALETTE[0].color;
    let mut best_distance = u32::MAX;

    for entry in PALETTE.iter() {
        let distance = distance_sq(rgb, entry.rgb);
        if distance < best_distance {
            best_distance = distance;
            best = entry.color;
        }
    }

    best
}

/// Squared Euclidean distance between two colors
pub(crate) fn distance_sq(a: Rgb, b: Rgb) -> u32 {
    let dr = a.r as i32 - b.r as i32;
    let dg = a.g as i32 - b.g as i32;
    let db = a.b as i32 - b.b as i32;
    (dr * dr + dg * dg + db * db) as u32
}
