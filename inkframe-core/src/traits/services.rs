//! Collaborators driven by the update state machine
//!
//! The firmware implements this over the Wi-Fi stack, the MQTT session,
//! the HTTP client, flash and the panel. Tests implement it with scripted
//! fakes.

use core::future::Future;

use inkframe_protocol::RemoteCommand;

use crate::acquire::AcquireError;
use crate::render::RenderError;
use crate::state::StatusView;

/// Everything one [`crate::state::UpdateMachine::tick`] may touch
pub trait FrameServices {
    /// Check whether the network link is up with an address
    fn network_up(&mut self) -> bool;

    /// Try to bring the network link back
    fn reconnect_network(&mut self) -> impl Future<Output = bool>;

    /// Check whether the remote channel session is established
    fn remote_connected(&mut self) -> bool;

    /// Try to open the remote channel session and re-register the device
    fn reconnect_remote(&mut self) -> impl Future<Output = bool>;

    /// Next pending remote command, without waiting for one
    fn poll_remote(&mut self) -> impl Future<Output = Option<RemoteCommand>>;

    /// Publish a status snapshot; failures are the implementation's concern
    fn publish_status(&mut self, view: &StatusView) -> impl Future<Output = ()>;

    /// Download `url` into the cached image slot
    ///
    /// Returns the committed image size in bytes.
    fn acquire(&mut self, url: &str) -> impl Future<Output = Result<usize, AcquireError>>;

    /// Draw the cached image on the panel
    fn render_image(&mut self) -> Result<(), RenderError>;

    /// Draw the built-in failure screen on the panel
    fn render_failure_screen(&mut self, hours_since_success: u32) -> Result<(), RenderError>;
}
