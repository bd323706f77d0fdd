//! Flash storage for the Pico W
//!
//! The 2MB flash is split three ways:
//!
//! ```text
//! 0x000000 ┌──────────────────────┐
//!          │ firmware + cyw43 fw  │ 1MB
//! 0x100000 ├──────────────────────┤
//!          │ image cache          │ 960KB
//! 0x1F0000 ├──────────────────────┤
//!          │ config (key-value)   │ 64KB
//! 0x200000 └──────────────────────┘
//! ```
//!
//! The config partition uses sequential-storage for wear leveling. The
//! image partition is driven by `inkframe_hal::PartitionImageStore` through
//! the blocking flash API.

use embassy_rp::dma::Channel;
use embassy_rp::flash::{Async, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use embedded_storage_async::nor_flash::NorFlash;
use inkframe_hal::PartitionImageStore;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

pub use inkframe_hal::flash::{FlashError, StorageKey};

pub const FLASH_SIZE: usize = 2 * 1024 * 1024;
pub const CONFIG_PARTITION_SIZE: usize = 64 * 1024;
pub const CONFIG_PARTITION_START: usize = FLASH_SIZE - CONFIG_PARTITION_SIZE;
pub const IMAGE_PARTITION_START: usize = 1024 * 1024;

pub const CONFIG_RANGE: core::ops::Range<u32> =
    (CONFIG_PARTITION_START as u32)..(FLASH_SIZE as u32);

pub const IMAGE_RANGE: core::ops::Range<u32> =
    (IMAGE_PARTITION_START as u32)..(CONFIG_PARTITION_START as u32);

/// Largest stored config value
const MAX_VALUE_SIZE: usize = 1024;

pub type Rp2040Flash<'d> = Flash<'d, FLASH, Async, FLASH_SIZE>;

/// Image cache over the image partition
pub type Rp2040ImageStore<'d> = PartitionImageStore<Rp2040Flash<'d>>;

/// Take the flash peripheral
pub fn flash<'d>(flash: Peri<'d, FLASH>, dma: Peri<'d, impl Channel>) -> Rp2040Flash<'d> {
    Flash::new(flash, dma)
}

/// Build the image cache, reading its commit record
pub fn image_store(flash: Rp2040Flash<'_>) -> Rp2040ImageStore<'_> {
    PartitionImageStore::new(flash, IMAGE_RANGE)
}

/// Wear-leveled config storage in the last 64KB of flash
pub struct Rp2040ConfigStorage<'d> {
    flash: Rp2040Flash<'d>,
}

impl<'d> Rp2040ConfigStorage<'d> {
    pub fn new(flash: Rp2040Flash<'d>) -> Self {
        Self { flash }
    }

    /// Hand the flash back once configuration is loaded
    pub fn into_inner(self) -> Rp2040Flash<'d> {
        self.flash
    }
}

impl inkframe_hal::FlashStorage for Rp2040ConfigStorage<'_> {
    async fn read(&mut self, key: StorageKey, buffer: &mut [u8]) -> Result<usize, FlashError> {
        let mut data_buffer = [0u8; MAX_VALUE_SIZE];

        let result = map::fetch_item::<StorageKey, &[u8], _>(
            &mut self.flash,
            CONFIG_RANGE,
            &mut NoCache::new(),
            &mut data_buffer,
            &key,
        )
        .await;

        match result {
            Ok(Some(data)) => {
                let len = data.len();
                if buffer.len() < len {
                    return Err(FlashError::BufferTooSmall);
                }
                buffer[..len].copy_from_slice(data);
                Ok(len)
            }
            Ok(None) => Err(FlashError::NotFound),
            Err(_) => Err(FlashError::Storage),
        }
    }

    async fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError> {
        let mut data_buffer = [0u8; MAX_VALUE_SIZE];

        map::store_item(
            &mut self.flash,
            CONFIG_RANGE,
            &mut NoCache::new(),
            &mut data_buffer,
            &key,
            &data,
        )
        .await
        .map_err(|_| FlashError::Storage)
    }

    async fn erase_all(&mut self) -> Result<(), FlashError> {
        NorFlash::erase(&mut self.flash, CONFIG_RANGE.start, CONFIG_RANGE.end)
            .await
            .map_err(|_| FlashError::Flash)
    }
}
