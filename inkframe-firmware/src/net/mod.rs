//! Network side of the frame
//!
//! Wi-Fi link management, the HTTP image client and the MQTT session, all
//! on top of one embassy-net stack.

pub mod http;
pub mod mqtt;
pub mod wifi;

pub use http::TcpHttpClient;
pub use mqtt::MqttSession;
pub use wifi::Wifi;

use embassy_net::dns::DnsQueryType;
use embassy_net::{IpAddress, Ipv4Address, Stack};

/// Resolve a host name or dotted IPv4 address
pub async fn resolve(stack: Stack<'_>, host: &str) -> Option<IpAddress> {
    if let Ok(ip) = host.parse::<Ipv4Address>() {
        return Some(IpAddress::Ipv4(ip));
    }
    match stack.dns_query(host, DnsQueryType::A).await {
        Ok(addrs) => addrs.first().copied(),
        Err(e) => {
            defmt::warn!("DNS lookup for {} failed: {:?}", host, e);
            None
        }
    }
}
