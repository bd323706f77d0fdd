//! 5.65" 7-color ACeP panel (600x448)
//!
//! The controller takes 4 bits per pixel, two pixels per byte with the
//! left pixel in the high nibble, using the palette codes 0-6 directly.
//! Image data is streamed after a single DATA_START command, so the frame
//! can be sent one band of rows at a time from a small page buffer.
//!
//! # Refresh Sequence
//!
//! - Hardware reset, wait for BUSY high (idle)
//! - Init register sequence ([`INIT_SEQUENCE`])
//! - RESOLUTION, DATA_START, then every page buffer in order
//! - POWER_ON, DISPLAY_REFRESH (about 12 s), POWER_OFF
//! - DEEP_SLEEP on [`PagedPanel::hibernate`]; the next frame resets again

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use inkframe_core::color::DeviceColor;
use inkframe_core::traits::{PagedPanel, PanelError};

/// Panel width in pixels
pub const WIDTH: u16 = 600;

/// Panel height in pixels
pub const HEIGHT: u16 = 448;

/// Rows per page buffer
pub const PAGE_ROWS: u16 = 16;

const ROW_BYTES: usize = WIDTH as usize / 2;
const PAGE_BYTES: usize = ROW_BYTES * PAGE_ROWS as usize;

/// Two white pixels
const WHITE_PAIR: u8 = (DeviceColor::White.code() << 4) | DeviceColor::White.code();

/// BUSY poll period
const POLL_MS: u32 = 10;

/// Default BUSY timeout; a full refresh takes well under this
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 60_000;

/// Controller commands
pub mod cmd {
    /// Panel setting
    pub const PANEL_SETTING: u8 = 0x00;
    /// Power setting
    pub const POWER_SETTING: u8 = 0x01;
    /// Power off
    pub const POWER_OFF: u8 = 0x02;
    /// Power off sequence setting
    pub const POWER_OFF_SEQUENCE: u8 = 0x03;
    /// Power on
    pub const POWER_ON: u8 = 0x04;
    /// Booster soft start
    pub const BOOSTER_SOFT_START: u8 = 0x06;
    /// Deep sleep (data 0xA5)
    pub const DEEP_SLEEP: u8 = 0x07;
    /// Start image data transmission
    pub const DATA_START: u8 = 0x10;
    /// Display refresh
    pub const DISPLAY_REFRESH: u8 = 0x12;
    /// PLL control
    pub const PLL_CONTROL: u8 = 0x30;
    /// Temperature sensor enable
    pub const TEMPERATURE_SENSOR: u8 = 0x41;
    /// VCOM and data interval setting
    pub const VCOM_DATA_INTERVAL: u8 = 0x50;
    /// TCON setting
    pub const TCON: u8 = 0x60;
    /// Resolution setting
    pub const RESOLUTION: u8 = 0x61;
    /// Power saving
    pub const POWER_SAVING: u8 = 0xE3;
}

/// Resolution payload: width and height, big-endian
const RESOLUTION_DATA: [u8; 4] = [
    (WIDTH >> 8) as u8,
    WIDTH as u8,
    (HEIGHT >> 8) as u8,
    HEIGHT as u8,
];

/// Register setup sent after every hardware reset
pub const INIT_SEQUENCE: &[(u8, &[u8])] = &[
    (cmd::PANEL_SETTING, &[0xEF, 0x08]),
    (cmd::POWER_SETTING, &[0x37, 0x00, 0x23, 0x23]),
    (cmd::POWER_OFF_SEQUENCE, &[0x00]),
    (cmd::BOOSTER_SOFT_START, &[0xC7, 0xC7, 0x1D]),
    (cmd::PLL_CONTROL, &[0x3C]),
    (cmd::TEMPERATURE_SENSOR, &[0x00]),
    (cmd::VCOM_DATA_INTERVAL, &[0x37]),
    (cmd::TCON, &[0x22]),
    (cmd::RESOLUTION, &RESOLUTION_DATA),
    (cmd::POWER_SAVING, &[0xAA]),
];

/// ACeP 5.65" driver
///
/// Holds one page buffer of [`PAGE_ROWS`] rows. Draws outside the band
/// being filled are discarded.
pub struct Acep565<SPI, BUSY, DC, RST, D> {
    spi: SPI,
    busy: BUSY,
    dc: DC,
    rst: RST,
    delay: D,
    /// Page being filled, `None` outside a frame
    page: Option<u16>,
    buffer: [u8; PAGE_BYTES],
    busy_timeout_ms: u32,
}

fn bus<E>(_: E) -> PanelError {
    PanelError::Bus
}

impl<SPI, BUSY, DC, RST, D> Acep565<SPI, BUSY, DC, RST, D>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    D: DelayNs,
{
    /// Create the driver; the panel is not touched until the first frame
    pub fn new(spi: SPI, busy: BUSY, dc: DC, rst: RST, delay: D) -> Self {
        Self {
            spi,
            busy,
            dc,
            rst,
            delay,
            page: None,
            buffer: [WHITE_PAIR; PAGE_BYTES],
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Override the BUSY timeout
    pub fn with_busy_timeout(mut self, timeout_ms: u32) -> Self {
        self.busy_timeout_ms = timeout_ms;
        self
    }

    /// Number of pages in one frame
    pub const fn page_count() -> u16 {
        HEIGHT.div_ceil(PAGE_ROWS)
    }

    fn command(&mut self, command: u8) -> Result<(), PanelError> {
        self.dc.set_low().map_err(bus)?;
        self.spi.write(&[command]).map_err(bus)
    }

    fn data(&mut self, data: &[u8]) -> Result<(), PanelError> {
        self.dc.set_high().map_err(bus)?;
        self.spi.write(data).map_err(bus)
    }

    fn command_with(&mut self, command: u8, data: &[u8]) -> Result<(), PanelError> {
        self.command(command)?;
        self.data(data)
    }

    /// Wait for BUSY high (idle)
    fn wait_idle(&mut self) -> Result<(), PanelError> {
        let mut waited = 0;
        while !self.busy.is_high().map_err(bus)? {
            if waited >= self.busy_timeout_ms {
                return Err(PanelError::Timeout);
            }
            self.delay.delay_ms(POLL_MS);
            waited += POLL_MS;
        }
        Ok(())
    }

    fn hard_reset(&mut self) -> Result<(), PanelError> {
        self.rst.set_high().map_err(bus)?;
        self.delay.delay_ms(200);
        self.rst.set_low().map_err(bus)?;
        self.delay.delay_ms(1);
        self.rst.set_high().map_err(bus)?;
        self.delay.delay_ms(200);
        self.wait_idle()
    }

    fn init(&mut self) -> Result<(), PanelError> {
        self.hard_reset()?;
        for &(command, data) in INIT_SEQUENCE {
            self.command_with(command, data)?;
        }
        self.delay.delay_ms(100);
        self.command_with(cmd::VCOM_DATA_INTERVAL, &[0x37])
    }

    fn refresh(&mut self) -> Result<(), PanelError> {
        self.command(cmd::POWER_ON)?;
        self.wait_idle()?;
        self.command(cmd::DISPLAY_REFRESH)?;
        self.wait_idle()?;
        self.command(cmd::POWER_OFF)?;
        self.delay.delay_ms(200);
        Ok(())
    }

    fn rows_in_page(page: u16) -> u16 {
        let top = page * PAGE_ROWS;
        PAGE_ROWS.min(HEIGHT - top)
    }
}

impl<SPI, BUSY, DC, RST, D> PagedPanel for Acep565<SPI, BUSY, DC, RST, D>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    D: DelayNs,
{
    fn size(&self) -> (u16, u16) {
        (WIDTH, HEIGHT)
    }

    fn first_page(&mut self) -> Result<(), PanelError> {
        self.page = None;
        self.init()?;
        self.command_with(cmd::RESOLUTION, &RESOLUTION_DATA)?;
        self.command(cmd::DATA_START)?;
        self.buffer.fill(WHITE_PAIR);
        self.page = Some(0);
        Ok(())
    }

    fn draw_pixel(&mut self, x: i32, y: i32, color: DeviceColor) {
        let Some(page) = self.page else { return };
        let top = page as i32 * PAGE_ROWS as i32;
        let bottom = (top + PAGE_ROWS as i32).min(HEIGHT as i32);
        if x < 0 || x >= WIDTH as i32 || y < top || y >= bottom {
            return;
        }

        let index = (y - top) as usize * ROW_BYTES + x as usize / 2;
        let byte = &mut self.buffer[index];
        if x % 2 == 0 {
            *byte = (*byte & 0x0F) | (color.code() << 4);
        } else {
            *byte = (*byte & 0xF0) | color.code();
        }
    }

    fn next_page(&mut self) -> Result<bool, PanelError> {
        let page = self.page.ok_or(PanelError::Sequence)?;
        let len = Self::rows_in_page(page) as usize * ROW_BYTES;

        self.dc.set_high().map_err(bus)?;
        self.spi.write(&self.buffer[..len]).map_err(bus)?;

        if page + 1 < Self::page_count() {
            self.buffer.fill(WHITE_PAIR);
            self.page = Some(page + 1);
            return Ok(true);
        }

        self.page = None;
        self.refresh()?;
        Ok(false)
    }

    fn hibernate(&mut self) -> Result<(), PanelError> {
        // An unfinished frame is dropped; the controller keeps the old image
        self.page = None;
        self.delay.delay_ms(100);
        self.command_with(cmd::DEEP_SLEEP, &[0xA5])?;
        self.delay.delay_ms(100);
        self.rst.set_low().map_err(bus)
    }
}
