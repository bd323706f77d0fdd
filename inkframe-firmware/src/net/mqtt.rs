//! MQTT session with the home automation broker
//!
//! One TCP socket, QoS 0 only. The session is driven entirely from the
//! control loop: commands are read with a short poll window, and keep-alive
//! pings go out from the same poll.

use defmt::*;
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration, Instant};
use embedded_io_async::Write;

use inkframe_core::config::MqttConfig;
use inkframe_protocol::messages::{OFFLINE, ONLINE};
use inkframe_protocol::{
    discovery_config, encode_connect, encode_disconnect, encode_pingreq, encode_publish,
    encode_subscribe, Connect, Entity, FrameError, Incoming, PacketParser, RemoteCommand,
    StatusReport, Topic, Topics, Will, MAX_BODY_SIZE,
};

use super::resolve;

pub const KEEP_ALIVE_S: u16 = 60;

const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a poll waits for inbound bytes
const POLL_WINDOW: Duration = Duration::from_millis(20);
/// Fixed header plus the largest body the codec handles
const PACKET_BUFFER: usize = MAX_BODY_SIZE + 5;
const READ_BUFFER: usize = 256;
const SUBSCRIBE_ID: u16 = 1;
/// Part of a packet kept free for the topic and headers
const MAX_TOPIC_RESERVE: usize = 160;

/// Session failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError {
    /// Broker host did not resolve
    Dns,
    /// TCP connect failed
    Connect,
    /// Broker refused the CONNECT with this return code
    Refused(u8),
    /// No CONNACK in time
    Timeout,
    /// Socket read or write failed, or the broker closed the connection
    Io,
    /// Broker sent something the codec cannot parse
    Protocol,
    /// Outbound packet did not fit the buffer
    Encode,
}

pub struct MqttSession<'a> {
    socket: TcpSocket<'a>,
    stack: Stack<'a>,
    config: &'a MqttConfig,
    topics: Topics<'a>,
    client_id: &'a str,
    parser: PacketParser,
    connected: bool,
    last_sent: Instant,
    out: [u8; PACKET_BUFFER],
    rx: [u8; READ_BUFFER],
    rx_pos: usize,
    rx_len: usize,
}

impl<'a> MqttSession<'a> {
    pub fn new(
        stack: Stack<'a>,
        rx_buffer: &'a mut [u8],
        tx_buffer: &'a mut [u8],
        config: &'a MqttConfig,
        device_name: &'a str,
    ) -> Self {
        Self {
            socket: TcpSocket::new(stack, rx_buffer, tx_buffer),
            stack,
            config,
            topics: Topics::new(config.base_topic.as_str(), device_name),
            client_id: device_name,
            parser: PacketParser::new(),
            connected: false,
            last_sent: Instant::now(),
            out: [0; PACKET_BUFFER],
            rx: [0; READ_BUFFER],
            rx_pos: 0,
            rx_len: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Open a fresh session: CONNECT with a last will, wait for CONNACK
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        self.connected = false;
        self.socket.abort();
        let _ = self.socket.flush().await;
        self.parser.reset();
        self.rx_pos = 0;
        self.rx_len = 0;

        let config = self.config;
        let addr = resolve(self.stack, &config.broker)
            .await
            .ok_or(MqttError::Dns)?;
        self.socket
            .set_timeout(Some(Duration::from_secs(KEEP_ALIVE_S as u64 * 2)));
        self.socket
            .connect((addr, config.port))
            .await
            .map_err(|_| MqttError::Connect)?;

        let availability = self
            .topics
            .topic(Topic::Availability)
            .map_err(|_| MqttError::Encode)?;
        let credentials = !config.username.is_empty() && !config.password.is_empty();
        let connect = Connect {
            client_id: self.client_id,
            keep_alive_s: KEEP_ALIVE_S,
            username: credentials.then_some(config.username.as_str()),
            password: credentials.then_some(config.password.as_str()),
            will: Some(Will {
                topic: &availability,
                payload: OFFLINE.as_bytes(),
                retain: true,
            }),
        };
        let len = encode_connect(&connect, &mut self.out).map_err(|_| MqttError::Encode)?;
        self.send(len).await?;

        match with_timeout(CONNACK_TIMEOUT, self.next_packet()).await {
            Ok(Ok(Incoming::ConnAck { return_code: 0, .. })) => {}
            Ok(Ok(Incoming::ConnAck { return_code, .. })) => {
                return Err(MqttError::Refused(return_code))
            }
            Ok(Ok(_)) => return Err(MqttError::Protocol),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(MqttError::Timeout),
        }

        self.connected = true;
        info!("MQTT connected to {}:{}", config.broker.as_str(), config.port);
        Ok(())
    }

    /// Subscribe to commands, register with discovery and mark online
    pub async fn announce(&mut self) -> Result<(), MqttError> {
        let command = self.topics.topic(Topic::Command).map_err(|_| MqttError::Encode)?;
        let len = encode_subscribe(SUBSCRIBE_ID, &command, &mut self.out)
            .map_err(|_| MqttError::Encode)?;
        self.send(len).await?;

        let mut payload = [0u8; MAX_BODY_SIZE - MAX_TOPIC_RESERVE];
        for entity in Entity::ALL {
            let topic = self.topics.discovery(entity).map_err(|_| MqttError::Encode)?;
            let n = discovery_config(entity, &self.topics, self.client_id, &mut payload)
                .map_err(|_| MqttError::Encode)?;
            self.publish(&topic, &payload[..n], true).await?;
        }

        let availability = self
            .topics
            .topic(Topic::Availability)
            .map_err(|_| MqttError::Encode)?;
        self.publish(&availability, ONLINE.as_bytes(), true).await
    }

    /// Publish a retained status snapshot
    pub async fn publish_status(&mut self, report: &StatusReport<'_>) -> Result<(), MqttError> {
        let mut payload = [0u8; 192];
        let n = report.encode(&mut payload).map_err(|_| MqttError::Encode)?;
        let topic = self.topics.topic(Topic::Status).map_err(|_| MqttError::Encode)?;
        self.publish(&topic, &payload[..n], true).await
    }

    /// Next remote command, if one arrives within the poll window
    ///
    /// Also keeps the session alive. Malformed commands are logged and
    /// skipped.
    pub async fn poll(&mut self) -> Option<RemoteCommand> {
        if !self.connected {
            return None;
        }

        if self.last_sent.elapsed() > Duration::from_secs(KEEP_ALIVE_S as u64 / 2) {
            let sent = match encode_pingreq(&mut self.out) {
                Ok(len) => self.send(len).await,
                Err(_) => Err(MqttError::Encode),
            };
            if let Err(e) = sent {
                warn!("MQTT ping failed: {:?}", e);
                return None;
            }
        }

        loop {
            match with_timeout(POLL_WINDOW, self.next_packet()).await {
                Err(_) => return None,
                Ok(Ok(Incoming::Publish(publish))) => {
                    if !self.topics.is_command(&publish.topic) {
                        debug!("Ignoring publish on {}", publish.topic.as_str());
                        continue;
                    }
                    match RemoteCommand::parse(&publish.payload) {
                        Ok(command) => return Some(command),
                        Err(e) => warn!("Ignoring malformed command: {:?}", e),
                    }
                }
                Ok(Ok(Incoming::PingResp)) => trace!("MQTT ping answered"),
                Ok(Ok(other)) => debug!("MQTT packet {}", Debug2Format(&other)),
                Ok(Err(e)) => {
                    warn!("MQTT session lost: {:?}", e);
                    self.connected = false;
                    return None;
                }
            }
        }
    }

    /// Send DISCONNECT and close; the broker then skips the last will
    pub async fn disconnect(&mut self) {
        if self.connected {
            if let Ok(len) = encode_disconnect(&mut self.out) {
                let _ = self.send(len).await;
            }
        }
        self.connected = false;
        self.socket.close();
        let _ = self.socket.flush().await;
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), MqttError> {
        let len = encode_publish(topic, payload, retain, &mut self.out)
            .map_err(|_| MqttError::Encode)?;
        self.send(len).await
    }

    async fn send(&mut self, len: usize) -> Result<(), MqttError> {
        if let Err(e) = self.socket.write_all(&self.out[..len]).await {
            warn!("MQTT write failed: {:?}", e);
            self.connected = false;
            return Err(MqttError::Io);
        }
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Read until the parser yields one packet
    async fn next_packet(&mut self) -> Result<Incoming, MqttError> {
        loop {
            while self.rx_pos < self.rx_len {
                let (used, result) = self.parser.feed_bytes(&self.rx[self.rx_pos..self.rx_len]);
                self.rx_pos += used;
                match result {
                    Ok(Some(packet)) => return Ok(packet),
                    Ok(None) => {}
                    // Already skipped by the parser
                    Err(FrameError::PacketTooLarge) => warn!("Dropped oversized MQTT packet"),
                    Err(_) => return Err(MqttError::Protocol),
                }
            }

            let n = self.socket.read(&mut self.rx).await.map_err(|_| MqttError::Io)?;
            if n == 0 {
                return Err(MqttError::Io);
            }
            self.rx_pos = 0;
            self.rx_len = n;
        }
    }
}
