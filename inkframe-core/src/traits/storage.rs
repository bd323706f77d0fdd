//! Cached image storage
//!
//! The frame keeps exactly one downloaded bitmap, and flash has no room
//! for a second copy. Starting a download therefore deletes the cached
//! image; the new bytes only become the cached image on
//! [`ImageStore::commit`]. Until then the store reports
//! [`StorageError::NoImage`].

use embedded_io::{Read, Seek};

/// Errors from image storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// No committed image exists
    NoImage,
    /// Read, write or erase failed
    Io,
    /// Image does not fit in the partition
    Full,
    /// Write or commit without a matching `begin_write`
    NotStaging,
}

/// Single-slot image storage
pub trait ImageStore {
    /// Seekable reader over the committed image
    type Reader<'a>: Read + Seek
    where
        Self: 'a;

    /// Open the committed image for reading
    fn open(&mut self) -> Result<Self::Reader<'_>, StorageError>;

    /// Check whether a committed image exists
    fn has_image(&mut self) -> bool;

    /// Delete the cached image and start staging a new one
    ///
    /// Any previously staged, uncommitted data is discarded too. Callers
    /// only start a write once the replacement is known to be coming.
    fn begin_write(&mut self) -> Result<(), StorageError>;

    /// Append bytes to the staged image
    fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError>;

    /// Replace the cached image with the staged one
    ///
    /// Returns the committed image length in bytes.
    fn commit(&mut self) -> Result<usize, StorageError>;

    /// Drop the staged image
    ///
    /// The image deleted by `begin_write` is not restored.
    fn abort(&mut self);
}
