//! In-memory fakes for host tests

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_io::{ErrorType, Read, Seek, SeekFrom};
use inkframe_protocol::RemoteCommand;

use crate::acquire::AcquireError;
use crate::color::DeviceColor;
use crate::render::RenderError;
use crate::state::StatusView;
use crate::traits::{
    FetchError, FrameServices, HttpClient, ImageStore, PagedPanel, PanelError, ResponseSink,
    StorageError, TransportError,
};

/// Read + Seek over a byte slice
pub struct MemReader<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> MemReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ErrorType for MemReader<'_> {
    type Error = core::convert::Infallible;
}

impl Read for MemReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let start = (self.pos as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        self.pos = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::End(off) => (self.data.len() as i64 + off).max(0) as u64,
            SeekFrom::Current(off) => (self.pos as i64 + off).max(0) as u64,
        };
        Ok(self.pos)
    }
}

fn header(pixel_offset: u32, width: i32, height: i32, bits: u16, file_len: usize) -> Vec<u8> {
    let mut h = vec![0u8; 54];
    h[0..2].copy_from_slice(b"BM");
    h[2..6].copy_from_slice(&(file_len as u32).to_le_bytes());
    h[10..14].copy_from_slice(&pixel_offset.to_le_bytes());
    h[14..18].copy_from_slice(&40u32.to_le_bytes());
    h[18..22].copy_from_slice(&width.to_le_bytes());
    h[22..26].copy_from_slice(&height.to_le_bytes());
    h[26..28].copy_from_slice(&1u16.to_le_bytes());
    h[28..30].copy_from_slice(&bits.to_le_bytes());
    h
}

fn stride(width: i32, bytes_per_pixel: usize) -> usize {
    (width as usize * bytes_per_pixel + 3) & !3
}

/// Bottom-up 24-bit BMP; `pixel(row, col)` returns (r, g, b) with row 0 at the top
pub fn bmp24(width: i32, height: i32, pixel: impl Fn(u32, u32) -> (u8, u8, u8)) -> Vec<u8> {
    let stride = stride(width, 3);
    let len = 54 + stride * height as usize;
    let mut file = header(54, width, height, 24, len);
    for stored in 0..height as u32 {
        let row = height as u32 - 1 - stored;
        let mut line = vec![0u8; stride];
        for col in 0..width as u32 {
            let (r, g, b) = pixel(row, col);
            let at = col as usize * 3;
            line[at..at + 3].copy_from_slice(&[b, g, r]);
        }
        file.extend_from_slice(&line);
    }
    file
}

/// Bottom-up 8-bit BMP; palette entries are stored (b, g, r)
pub fn bmp8(
    width: i32,
    height: i32,
    palette: &[(u8, u8, u8); 256],
    index: impl Fn(u32, u32) -> u8,
) -> Vec<u8> {
    let stride = stride(width, 1);
    let offset = 54 + 256 * 4;
    let len = offset + stride * height as usize;
    let mut file = header(offset as u32, width, height, 8, len);
    file[46..50].copy_from_slice(&256u32.to_le_bytes());
    for &(b, g, r) in palette {
        file.extend_from_slice(&[b, g, r, 0]);
    }
    for stored in 0..height as u32 {
        let row = height as u32 - 1 - stored;
        let mut line = vec![0u8; stride];
        for col in 0..width as u32 {
            line[col as usize] = index(row, col);
        }
        file.extend_from_slice(&line);
    }
    file
}

/// Single-slot store backed by vectors
pub struct MemoryStore {
    capacity: usize,
    committed: Option<Vec<u8>>,
    staged: Option<Vec<u8>>,
    pub begin_calls: u32,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            committed: None,
            staged: None,
            begin_calls: 0,
        }
    }

    pub fn with_image(image: &[u8]) -> Self {
        let mut store = Self::new(image.len().max(1024));
        store.committed = Some(image.to_vec());
        store
    }

    pub fn committed(&self) -> Option<&[u8]> {
        self.committed.as_deref()
    }

    pub fn is_staging(&self) -> bool {
        self.staged.is_some()
    }
}

impl ImageStore for MemoryStore {
    type Reader<'a> = MemReader<'a>;

    fn open(&mut self) -> Result<Self::Reader<'_>, StorageError> {
        self.committed
            .as_deref()
            .map(MemReader::new)
            .ok_or(StorageError::NoImage)
    }

    fn has_image(&mut self) -> bool {
        self.committed.is_some()
    }

    fn begin_write(&mut self) -> Result<(), StorageError> {
        self.begin_calls += 1;
        self.committed = None;
        self.staged = Some(Vec::new());
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let staged = self.staged.as_mut().ok_or(StorageError::NotStaging)?;
        if staged.len() + chunk.len() > self.capacity {
            return Err(StorageError::Full);
        }
        staged.extend_from_slice(chunk);
        Ok(())
    }

    fn commit(&mut self) -> Result<usize, StorageError> {
        let staged = self.staged.take().ok_or(StorageError::NotStaging)?;
        let len = staged.len();
        self.committed = Some(staged);
        Ok(len)
    }

    fn abort(&mut self) {
        self.staged = None;
    }
}

/// One canned HTTP exchange
pub struct ScriptedResponse {
    status: u16,
    body: Vec<u8>,
    fail_before: Option<TransportError>,
    fail_after: Option<TransportError>,
}

impl ScriptedResponse {
    pub fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            body: body.to_vec(),
            fail_before: None,
            fail_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: b"error page".to_vec(),
            fail_before: None,
            fail_after: None,
        }
    }

    pub fn fail(error: TransportError) -> Self {
        Self {
            fail_before: Some(error),
            ..Self::status(0)
        }
    }

    pub fn then_fail(mut self, error: TransportError) -> Self {
        self.fail_after = Some(error);
        self
    }
}

/// HTTP client replaying scripted responses, body delivered in small chunks
pub struct ScriptedHttp {
    responses: VecDeque<ScriptedResponse>,
    pub requests: Vec<String>,
}

impl ScriptedHttp {
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            requests: Vec::new(),
        }
    }
}

impl HttpClient for ScriptedHttp {
    async fn get<S: ResponseSink>(&mut self, url: &str, sink: &mut S) -> Result<u16, FetchError> {
        self.requests.push(url.to_string());
        let response = self
            .responses
            .pop_front()
            .ok_or(FetchError::Transport(TransportError::Connect))?;

        if let Some(e) = response.fail_before {
            return Err(e.into());
        }
        if sink.on_status(response.status) {
            for chunk in response.body.chunks(5) {
                sink.on_chunk(chunk)?;
            }
        }
        if let Some(e) = response.fail_after {
            return Err(e.into());
        }
        Ok(response.status)
    }
}

/// Panel that keeps the whole frame and enforces page bands
pub struct RecordingPanel {
    width: u16,
    height: u16,
    page_height: u16,
    page: Option<u16>,
    pub frame: Vec<Option<DeviceColor>>,
    pub pages_committed: u32,
    pub hibernations: u32,
    pub fail_on_page: Option<u16>,
}

impl RecordingPanel {
    pub fn new(width: u16, height: u16, page_height: u16) -> Self {
        Self {
            width,
            height,
            page_height,
            page: None,
            frame: vec![None; width as usize * height as usize],
            pages_committed: 0,
            hibernations: 0,
            fail_on_page: None,
        }
    }

    pub fn at(&self, x: u16, y: u16) -> Option<DeviceColor> {
        self.frame[y as usize * self.width as usize + x as usize]
    }

    pub fn count(&self, color: DeviceColor) -> usize {
        self.frame.iter().filter(|&&c| c == Some(color)).count()
    }

    fn page_count(&self) -> u16 {
        self.height.div_ceil(self.page_height)
    }
}

impl PagedPanel for RecordingPanel {
    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn first_page(&mut self) -> Result<(), PanelError> {
        self.page = Some(0);
        Ok(())
    }

    fn draw_pixel(&mut self, x: i32, y: i32, color: DeviceColor) {
        let Some(page) = self.page else { return };
        let top = page as i32 * self.page_height as i32;
        let bottom = top + self.page_height as i32;
        if x < 0 || x >= self.width as i32 || y < top || y >= bottom || y >= self.height as i32 {
            return;
        }
        self.frame[y as usize * self.width as usize + x as usize] = Some(color);
    }

    fn next_page(&mut self) -> Result<bool, PanelError> {
        let page = self.page.ok_or(PanelError::Sequence)?;
        if self.fail_on_page == Some(page) {
            return Err(PanelError::Bus);
        }
        self.pages_committed += 1;
        if page + 1 >= self.page_count() {
            self.page = None;
            Ok(false)
        } else {
            self.page = Some(page + 1);
            Ok(true)
        }
    }

    fn hibernate(&mut self) -> Result<(), PanelError> {
        self.page = None;
        self.hibernations += 1;
        Ok(())
    }
}

/// Scripted collaborators for the update state machine
pub struct FakeServices {
    pub network: bool,
    pub network_comes_back: bool,
    pub remote: bool,
    pub remote_comes_back: bool,
    pub commands: VecDeque<RemoteCommand>,
    pub acquire_results: VecDeque<Result<usize, AcquireError>>,
    pub render_result: Result<(), RenderError>,
    pub acquire_hangs: bool,

    pub network_reconnects: u32,
    pub remote_reconnects: u32,
    pub acquired: Vec<String>,
    pub renders: u32,
    pub failure_screens: Vec<u32>,
    pub published: Vec<StatusView>,
}

impl FakeServices {
    /// Network and remote channel up, every download succeeds
    pub fn online() -> Self {
        Self {
            network: true,
            network_comes_back: false,
            remote: true,
            remote_comes_back: false,
            commands: VecDeque::new(),
            acquire_results: VecDeque::new(),
            render_result: Ok(()),
            acquire_hangs: false,
            network_reconnects: 0,
            remote_reconnects: 0,
            acquired: Vec::new(),
            renders: 0,
            failure_screens: Vec::new(),
            published: Vec::new(),
        }
    }
}

impl FrameServices for FakeServices {
    fn network_up(&mut self) -> bool {
        self.network
    }

    async fn reconnect_network(&mut self) -> bool {
        self.network_reconnects += 1;
        self.network = self.network_comes_back;
        self.network
    }

    fn remote_connected(&mut self) -> bool {
        self.remote
    }

    async fn reconnect_remote(&mut self) -> bool {
        self.remote_reconnects += 1;
        self.remote = self.remote_comes_back;
        self.remote
    }

    async fn poll_remote(&mut self) -> Option<RemoteCommand> {
        self.commands.pop_front()
    }

    async fn publish_status(&mut self, view: &StatusView) {
        self.published.push(*view);
    }

    async fn acquire(&mut self, url: &str) -> Result<usize, AcquireError> {
        self.acquired.push(url.to_string());
        if self.acquire_hangs {
            core::future::pending::<()>().await;
        }
        self.acquire_results.pop_front().unwrap_or(Ok(1000))
    }

    fn render_image(&mut self) -> Result<(), RenderError> {
        self.renders += 1;
        self.render_result
    }

    fn render_failure_screen(&mut self, hours_since_success: u32) -> Result<(), RenderError> {
        self.failure_screens.push(hours_since_success);
        Ok(())
    }
}
