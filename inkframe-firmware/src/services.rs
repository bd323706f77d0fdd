//! Board-side collaborators of the update state machine

use defmt::*;

use inkframe_core::acquire::{acquire, AcquireError};
use inkframe_core::render::{render_cached_image, render_failure_screen, RenderError};
use inkframe_core::state::StatusView;
use inkframe_core::traits::{FrameServices, ImageStore, PagedPanel};
use inkframe_protocol::{RemoteCommand, StatusReport};

use crate::net::{MqttSession, TcpHttpClient, Wifi};

/// Radio, remote channel, image cache and panel, owned by the control loop
pub struct FrameIo<'a, P, S> {
    pub wifi: Wifi<'a>,
    pub http: TcpHttpClient<'a>,
    /// `None` when MQTT is disabled in the configuration
    pub mqtt: Option<MqttSession<'a>>,
    pub store: S,
    pub panel: P,
}

impl<'a, P, S> FrameIo<'a, P, S>
where
    P: PagedPanel,
    S: ImageStore,
{
    pub fn new(
        wifi: Wifi<'a>,
        http: TcpHttpClient<'a>,
        mqtt: Option<MqttSession<'a>>,
        store: S,
        panel: P,
    ) -> Self {
        Self {
            wifi,
            http,
            mqtt,
            store,
            panel,
        }
    }

    /// Say goodbye to the broker and drop the radio to its lowest power
    pub async fn shut_down_radio(&mut self) {
        if let Some(mqtt) = self.mqtt.as_mut() {
            mqtt.disconnect().await;
        }
        self.wifi.power_down().await;
    }
}

impl<P, S> FrameServices for FrameIo<'_, P, S>
where
    P: PagedPanel,
    S: ImageStore,
{
    fn network_up(&mut self) -> bool {
        self.wifi.is_up()
    }

    async fn reconnect_network(&mut self) -> bool {
        self.wifi.join().await
    }

    fn remote_connected(&mut self) -> bool {
        self.mqtt.as_ref().is_some_and(|m| m.is_connected())
    }

    async fn reconnect_remote(&mut self) -> bool {
        let Some(mqtt) = self.mqtt.as_mut() else {
            return false;
        };
        if let Err(e) = mqtt.connect().await {
            warn!("MQTT connect failed: {:?}", e);
            return false;
        }
        if let Err(e) = mqtt.announce().await {
            warn!("MQTT announce failed: {:?}", e);
            return false;
        }
        true
    }

    async fn poll_remote(&mut self) -> Option<RemoteCommand> {
        let command = self.mqtt.as_mut()?.poll().await;
        if let Some(command) = &command {
            info!(
                "Remote command {:?} (url override: {})",
                command.kind,
                command.url.is_some()
            );
        }
        command
    }

    async fn publish_status(&mut self, view: &StatusView) {
        let Some(mqtt) = self.mqtt.as_mut() else {
            return;
        };
        if !mqtt.is_connected() {
            return;
        }

        let ip = self.wifi.ip();
        let rssi = self.wifi.rssi().await;
        let report = StatusReport {
            ip: ip.as_str(),
            rssi,
            status: view.status_text(),
            since_success_s: view.since_success_s,
            failure_mode: view.failure_mode,
        };
        if let Err(e) = mqtt.publish_status(&report).await {
            warn!("Status publish failed: {:?}", e);
        }
    }

    async fn acquire(&mut self, url: &str) -> Result<usize, AcquireError> {
        info!("Fetching {}", url);
        let online = self.wifi.is_up();
        let result = acquire(online, url, &mut self.http, &mut self.store).await;
        match &result {
            Ok(len) => info!("Cached {} byte image", len),
            Err(e) => warn!("Download failed: {:?}", e),
        }
        result
    }

    fn render_image(&mut self) -> Result<(), RenderError> {
        match render_cached_image(&mut self.store, &mut self.panel) {
            Ok(pages) => {
                info!("Image drawn in {} pages", pages);
                Ok(())
            }
            Err(e) => {
                warn!("Render failed: {:?}", e);
                Err(e)
            }
        }
    }

    fn render_failure_screen(&mut self, hours_since_success: u32) -> Result<(), RenderError> {
        warn!("No good picture for {} h, showing failure screen", hours_since_success);
        render_failure_screen(&mut self.panel, hours_since_success).map_err(|e| {
            error!("Failure screen not drawn: {:?}", e);
            RenderError::from(e)
        })
    }
}
