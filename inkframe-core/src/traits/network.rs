//! HTTP client abstraction used by image acquisition

use super::storage::StorageError;

/// Transport-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// URL could not be parsed
    InvalidUrl,
    /// Host name lookup failed
    Dns,
    /// TCP connect failed
    Connect,
    /// Request or body read exceeded the timeout
    Timeout,
    /// Malformed HTTP response
    Protocol,
    /// Connection dropped mid-body
    Closed,
}

/// Errors returned by [`HttpClient::get`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FetchError {
    /// Network or protocol failure
    Transport(TransportError),
    /// The sink refused a body chunk
    Sink(StorageError),
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        FetchError::Transport(e)
    }
}

impl From<StorageError> for FetchError {
    fn from(e: StorageError) -> Self {
        FetchError::Sink(e)
    }
}

/// Receiver for a streamed HTTP response
pub trait ResponseSink {
    /// Called once with the response status
    ///
    /// Return `true` to receive the body, `false` to skip it.
    fn on_status(&mut self, status: u16) -> bool;

    /// Called for each body chunk, in order
    fn on_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError>;
}

/// Minimal streaming HTTP GET
///
/// Implementations enforce their own request timeout.
pub trait HttpClient {
    /// Issue a GET and stream the response into `sink`
    ///
    /// Returns the HTTP status code.
    fn get<S: ResponseSink>(
        &mut self,
        url: &str,
        sink: &mut S,
    ) -> impl core::future::Future<Output = Result<u16, FetchError>>;
}
