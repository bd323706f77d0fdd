//! Streaming HTTP image client over an embassy-net TCP socket

use defmt::*;
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration};
use embedded_io_async::Write;

use inkframe_core::traits::{FetchError, HttpClient, ResponseSink, TransportError};
use inkframe_protocol::http::{encode_get, ResponseHead, Url, MAX_HEAD_LEN};

use super::resolve;

const RX_BUFFER: usize = 4096;
const TX_BUFFER: usize = 512;
const CHUNK: usize = 1024;

/// Socket-level inactivity limit inside the whole-request timeout
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client with a whole-request timeout
pub struct TcpHttpClient<'a> {
    stack: Stack<'a>,
    timeout: Duration,
    rx: [u8; RX_BUFFER],
    tx: [u8; TX_BUFFER],
}

impl<'a> TcpHttpClient<'a> {
    pub fn new(stack: Stack<'a>, timeout_s: u32) -> Self {
        Self {
            stack,
            timeout: Duration::from_secs(timeout_s as u64),
            rx: [0; RX_BUFFER],
            tx: [0; TX_BUFFER],
        }
    }

    async fn exchange<S: ResponseSink>(
        &mut self,
        url: &str,
        sink: &mut S,
    ) -> Result<u16, FetchError> {
        let url = Url::parse(url).map_err(|_| TransportError::InvalidUrl)?;
        let addr = resolve(self.stack, url.host).await.ok_or(TransportError::Dns)?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx, &mut self.tx);
        socket.set_timeout(Some(IDLE_TIMEOUT));
        socket
            .connect((addr, url.port))
            .await
            .map_err(|_| TransportError::Connect)?;

        let mut request = [0u8; 512];
        let len = encode_get(&url, &mut request).map_err(|_| TransportError::InvalidUrl)?;
        socket
            .write_all(&request[..len])
            .await
            .map_err(|_| TransportError::Closed)?;

        let result = stream_response(&mut socket, sink).await;
        socket.abort();
        let _ = socket.flush().await;
        result
    }
}

async fn stream_response<S: ResponseSink>(
    socket: &mut TcpSocket<'_>,
    sink: &mut S,
) -> Result<u16, FetchError> {
    let mut head_buf = [0u8; MAX_HEAD_LEN];
    let mut filled = 0;
    let (head, body_start) = loop {
        let n = socket
            .read(&mut head_buf[filled..])
            .await
            .map_err(|_| TransportError::Closed)?;
        if n == 0 {
            return Err(TransportError::Protocol.into());
        }
        filled += n;
        let parsed =
            ResponseHead::parse(&head_buf[..filled]).map_err(|_| TransportError::Protocol)?;
        if let Some(parsed) = parsed {
            break parsed;
        }
    };

    debug!("HTTP {} (length {:?})", head.status, head.content_length);
    if !sink.on_status(head.status) {
        return Ok(head.status);
    }

    let mut received = (filled - body_start) as u32;
    if received > 0 {
        sink.on_chunk(&head_buf[body_start..filled])?;
    }

    let mut chunk = [0u8; CHUNK];
    while head.content_length.map_or(true, |len| received < len) {
        match socket.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                sink.on_chunk(&chunk[..n])?;
                received += n as u32;
            }
            Err(_) => return Err(TransportError::Closed.into()),
        }
    }

    if head.content_length.is_some_and(|len| received < len) {
        warn!("Body ended after {} bytes", received);
        return Err(TransportError::Closed.into());
    }
    Ok(head.status)
}

impl HttpClient for TcpHttpClient<'_> {
    async fn get<S: ResponseSink>(&mut self, url: &str, sink: &mut S) -> Result<u16, FetchError> {
        match with_timeout(self.timeout, self.exchange(url, sink)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("HTTP request timed out");
                Err(TransportError::Timeout.into())
            }
        }
    }
}
