//! Image acquisition
//!
//! Downloads the server-rendered bitmap into the cached image slot. Statuses
//! other than 2xx and failures before the status line never touch the
//! store. A 2xx status deletes the previous image and streams the body into
//! its place; a failure mid-body aborts the staged copy and leaves the slot
//! empty, so the renderer reports `NoImage` instead of drawing a truncated
//! picture.

use crate::traits::{FetchError, HttpClient, ImageStore, ResponseSink, StorageError, TransportError};

/// Why a download did not produce an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DownloadError {
    /// Server answered with a non-2xx status
    Status(u16),
    /// Connection, timeout or protocol failure
    Transport(TransportError),
    /// Successful status with an empty body
    EmptyBody,
}

/// Acquisition failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquireError {
    /// No network path; no request was made
    Connectivity,
    /// HTTP-level failure
    Download(DownloadError),
    /// Cache could not be written
    Storage(StorageError),
}

impl From<DownloadError> for AcquireError {
    fn from(e: DownloadError) -> Self {
        AcquireError::Download(e)
    }
}

impl From<StorageError> for AcquireError {
    fn from(e: StorageError) -> Self {
        AcquireError::Storage(e)
    }
}

/// Check for a 2xx status
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Response sink that stages the body in an [`ImageStore`]
struct CacheWriter<'a, S> {
    store: &'a mut S,
    staging: bool,
    begin_error: Option<StorageError>,
    written: usize,
}

impl<'a, S: ImageStore> CacheWriter<'a, S> {
    fn new(store: &'a mut S) -> Self {
        Self {
            store,
            staging: false,
            begin_error: None,
            written: 0,
        }
    }
}

impl<S: ImageStore> ResponseSink for CacheWriter<'_, S> {
    fn on_status(&mut self, status: u16) -> bool {
        if !is_success(status) {
            return false;
        }
        match self.store.begin_write() {
            Ok(()) => {
                self.staging = true;
                true
            }
            Err(e) => {
                self.begin_error = Some(e);
                false
            }
        }
    }

    fn on_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        if !self.staging {
            return Err(StorageError::NotStaging);
        }
        self.store.write(chunk)?;
        self.written += chunk.len();
        Ok(())
    }
}

/// Fetch `url` into `store`
///
/// Fails with [`AcquireError::Connectivity`] without issuing a request when
/// `online` is false. Returns the committed image size on success.
pub async fn acquire<H, S>(
    online: bool,
    url: &str,
    http: &mut H,
    store: &mut S,
) -> Result<usize, AcquireError>
where
    H: HttpClient,
    S: ImageStore,
{
    if !online {
        return Err(AcquireError::Connectivity);
    }

    let mut writer = CacheWriter::new(store);
    let result = http.get(url, &mut writer).await;
    let CacheWriter {
        store,
        staging,
        begin_error,
        written,
    } = writer;

    match result {
        Ok(status) if is_success(status) => {
            if let Some(e) = begin_error {
                return Err(AcquireError::Storage(e));
            }
            if written == 0 {
                store.abort();
                return Err(DownloadError::EmptyBody.into());
            }
            Ok(store.commit()?)
        }
        Ok(status) => Err(DownloadError::Status(status).into()),
        Err(e) => {
            if staging {
                store.abort();
            }
            Err(match e {
                FetchError::Transport(t) => DownloadError::Transport(t).into(),
                FetchError::Sink(s) => AcquireError::Storage(s),
            })
        }
    }
}
