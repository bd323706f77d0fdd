//! Single-slot image cache on a NOR flash partition
//!
//! Layout: the first erase block holds the commit record, the rest holds the
//! image bytes.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────┐
//! │ commit block │ image data ...                       │
//! │ magic, len,  │                                      │
//! │ !len         │                                      │
//! └──────────────┴──────────────────────────────────────┘
//! ```
//!
//! `begin_write` erases the commit block, which deletes the cached image.
//! Data is then programmed page by page and `commit` writes the record
//! last. A download that is aborted or cut short by a reset therefore reads
//! back as "no image", never as a truncated one.

use core::ops::Range;

use embedded_io::{ErrorKind, ErrorType, Read, Seek, SeekFrom};
use embedded_storage::nor_flash::NorFlash;
use inkframe_core::traits::{ImageStore, StorageError};

/// Program granularity; a multiple of any supported flash write size
pub const PAGE_SIZE: usize = 256;

const MAGIC: u32 = 0x494B_4631; // "IKF1"
const RECORD_LEN: usize = 12;

struct Staging {
    /// Bytes accepted so far, including those still in `page`
    len: u32,
    /// End of the erased region
    erased_to: u32,
    page: [u8; PAGE_SIZE],
    fill: usize,
}

/// [`ImageStore`] over a flash partition
pub struct PartitionImageStore<F> {
    flash: F,
    range: Range<u32>,
    committed: Option<u32>,
    staging: Option<Staging>,
}

impl<F: NorFlash> PartitionImageStore<F> {
    /// Take over a partition and read its commit record
    ///
    /// `range` must be erase-block aligned and at least two blocks long.
    pub fn new(mut flash: F, range: Range<u32>) -> Self {
        let committed = read_record(&mut flash, range.start)
            .filter(|len| *len <= range.end - range.start - F::ERASE_SIZE as u32);
        Self {
            flash,
            range,
            committed,
            staging: None,
        }
    }

    /// Release the flash driver
    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Largest image the partition can hold
    pub fn capacity(&self) -> u32 {
        self.range.end - self.data_start()
    }

    /// Length of the committed image
    pub fn image_len(&self) -> Option<u32> {
        self.committed
    }

    fn data_start(&self) -> u32 {
        self.range.start + F::ERASE_SIZE as u32
    }

    fn flush_page(&mut self) -> Result<(), StorageError> {
        let data_start = self.data_start();
        let Some(staging) = self.staging.as_mut() else {
            return Err(StorageError::NotStaging);
        };
        let offset = data_start + staging.len - staging.fill as u32;
        let end = offset + PAGE_SIZE as u32;

        while staging.erased_to < end {
            let block_end = staging.erased_to + F::ERASE_SIZE as u32;
            self.flash
                .erase(staging.erased_to, block_end)
                .map_err(|_| StorageError::Io)?;
            staging.erased_to = block_end;
        }

        staging.page[staging.fill..].fill(0xFF);
        self.flash
            .write(offset, &staging.page)
            .map_err(|_| StorageError::Io)?;
        staging.fill = 0;
        Ok(())
    }
}

fn read_record<F: NorFlash>(flash: &mut F, at: u32) -> Option<u32> {
    let mut record = [0u8; RECORD_LEN];
    flash.read(at, &mut record).ok()?;

    let word = |i: usize| {
        u32::from_le_bytes([record[i], record[i + 1], record[i + 2], record[i + 3]])
    };
    let (magic, len, check) = (word(0), word(4), word(8));
    (magic == MAGIC && check == !len).then_some(len)
}

impl<F: NorFlash> ImageStore for PartitionImageStore<F> {
    type Reader<'a>
        = PartitionReader<'a, F>
    where
        Self: 'a;

    fn open(&mut self) -> Result<Self::Reader<'_>, StorageError> {
        let len = self.committed.ok_or(StorageError::NoImage)?;
        let base = self.data_start();
        Ok(PartitionReader {
            flash: &mut self.flash,
            base,
            len,
            pos: 0,
        })
    }

    fn has_image(&mut self) -> bool {
        self.committed.is_some()
    }

    fn begin_write(&mut self) -> Result<(), StorageError> {
        self.staging = None;
        self.committed = None;

        let record_end = self.data_start();
        self.flash
            .erase(self.range.start, record_end)
            .map_err(|_| StorageError::Io)?;

        self.staging = Some(Staging {
            len: 0,
            erased_to: record_end,
            page: [0xFF; PAGE_SIZE],
            fill: 0,
        });
        Ok(())
    }

    fn write(&mut self, mut chunk: &[u8]) -> Result<(), StorageError> {
        let capacity = self.capacity();
        let staging = self.staging.as_mut().ok_or(StorageError::NotStaging)?;
        if staging.len as usize + chunk.len() > capacity as usize {
            return Err(StorageError::Full);
        }

        while !chunk.is_empty() {
            let Some(staging) = self.staging.as_mut() else {
                return Err(StorageError::NotStaging);
            };
            let n = chunk.len().min(PAGE_SIZE - staging.fill);
            staging.page[staging.fill..staging.fill + n].copy_from_slice(&chunk[..n]);
            staging.fill += n;
            staging.len += n as u32;
            chunk = &chunk[n..];

            if staging.fill == PAGE_SIZE {
                self.flush_page()?;
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<usize, StorageError> {
        let (len, fill) = match &self.staging {
            Some(staging) => (staging.len, staging.fill),
            None => return Err(StorageError::NotStaging),
        };
        if fill > 0 {
            self.flush_page()?;
        }

        let mut record = [0xFFu8; PAGE_SIZE];
        record[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        record[4..8].copy_from_slice(&len.to_le_bytes());
        record[8..12].copy_from_slice(&(!len).to_le_bytes());
        self.flash
            .write(self.range.start, &record)
            .map_err(|_| StorageError::Io)?;

        self.staging = None;
        self.committed = Some(len);
        Ok(len as usize)
    }

    fn abort(&mut self) {
        self.staging = None;
    }
}

/// Seekable reader over the committed image
pub struct PartitionReader<'a, F> {
    flash: &'a mut F,
    base: u32,
    len: u32,
    pos: u32,
}

impl<F> ErrorType for PartitionReader<'_, F> {
    type Error = ErrorKind;
}

impl<F: NorFlash> Read for PartitionReader<'_, F> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let n = buf.len().min((self.len - self.pos) as usize);
        self.flash
            .read(self.base + self.pos, &mut buf[..n])
            .map_err(|_| ErrorKind::Other)?;
        self.pos += n as u32;
        Ok(n)
    }
}

impl<F: NorFlash> Seek for PartitionReader<'_, F> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(off) => self.len as i64 + off,
            SeekFrom::Current(off) => self.pos as i64 + off,
        };
        if target < 0 || target > u32::MAX as i64 {
            return Err(ErrorKind::InvalidInput);
        }
        self.pos = target as u32;
        Ok(self.pos as u64)
    }
}
