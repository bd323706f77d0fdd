//! Wi-Fi link supervision

use core::fmt::Write;

use cyw43::{Control, JoinOptions, PowerManagementMode};
use defmt::*;
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration};
use heapless::String;

/// How long DHCP may take after a successful join
const DHCP_TIMEOUT: Duration = Duration::from_secs(20);

/// Joined-or-not view of the radio and the IP stack
pub struct Wifi<'a> {
    control: Control<'static>,
    stack: Stack<'a>,
    ssid: &'a str,
    password: &'a str,
}

impl<'a> Wifi<'a> {
    pub fn new(
        control: Control<'static>,
        stack: Stack<'a>,
        ssid: &'a str,
        password: &'a str,
    ) -> Self {
        Self {
            control,
            stack,
            ssid,
            password,
        }
    }

    /// Link up with a DHCP lease
    pub fn is_up(&self) -> bool {
        self.stack.is_link_up() && self.stack.config_v4().is_some()
    }

    /// Join the configured network and wait for an address
    pub async fn join(&mut self) -> bool {
        info!("Joining Wi-Fi network '{}'", self.ssid);

        let options = if self.password.is_empty() {
            JoinOptions::new_open()
        } else {
            JoinOptions::new(self.password.as_bytes())
        };
        if self.control.join(self.ssid, options).await.is_err() {
            warn!("Wi-Fi join failed");
            return false;
        }

        if with_timeout(DHCP_TIMEOUT, self.stack.wait_config_up()).await.is_err() {
            warn!("No DHCP lease after join");
            return false;
        }

        if let Some(config) = self.stack.config_v4() {
            info!("Wi-Fi up, address {}", config.address);
        }
        true
    }

    /// Current address as text, empty while down
    pub fn ip(&self) -> String<16> {
        let mut out = String::new();
        if let Some(config) = self.stack.config_v4() {
            // 15 characters at most
            let _ = write!(out, "{}", config.address.address());
        }
        out
    }

    /// Signal strength of the current association (dBm)
    pub async fn rssi(&mut self) -> i16 {
        let rssi = self.control.get_rssi().await;
        i16::try_from(rssi).unwrap_or(i16::MIN)
    }

    /// Leave the network and put the radio in its lowest power mode
    pub async fn power_down(&mut self) {
        self.control.leave().await;
        self.control
            .set_power_management(PowerManagementMode::SuperSave)
            .await;
        info!("Wi-Fi powered down");
    }
}
