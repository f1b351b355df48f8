//! Wake-on-LAN magic packets.
//!
//! A sleeping LAN server can be woken before its local address is probed.
//! The packet is 6 bytes of `0xFF` followed by the target MAC repeated 16
//! times, broadcast over UDP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::error::ErrorCode;
use crate::model::WakeOnLanInfo;

/// Magic packet length: sync stream plus 16 MAC repetitions.
pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;

/// Errors from sending a wake packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WakeError {
    /// The MAC address string could not be parsed.
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// The UDP socket could not be created or the send failed.
    #[error("socket error: {0}")]
    Socket(String),
}

impl ErrorCode for WakeError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidMac(_) => "invalid_mac",
            Self::Socket(_) => "wake_socket_error",
        }
    }
}

/// Result type for wake operations.
pub type WakeResult<T> = Result<T, WakeError>;

/// Parses `AA:BB:CC:DD:EE:FF`, `AA-BB-...` or `AABBCCDDEEFF`.
///
/// # Errors
///
/// Returns [`WakeError::InvalidMac`] unless the input holds exactly six hex octets.
pub fn parse_mac(mac: &str) -> WakeResult<[u8; 6]> {
    let digits: String = mac
        .trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect();
    let bytes = hex::decode(&digits).map_err(|_| WakeError::InvalidMac(mac.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| WakeError::InvalidMac(mac.to_string()))
}

/// Builds the magic packet for `mac`.
///
/// # Errors
///
/// Returns [`WakeError::InvalidMac`] if `mac` does not parse.
pub fn magic_packet(mac: &str) -> WakeResult<Vec<u8>> {
    let octets = parse_mac(mac)?;
    let mut packet = Vec::with_capacity(MAGIC_PACKET_LEN);
    packet.extend_from_slice(&[0xFF; 6]);
    for _ in 0..16 {
        packet.extend_from_slice(&octets);
    }
    Ok(packet)
}

/// Sends wake packets for Wake-on-LAN hints.
#[async_trait]
pub trait WakeOnLan: Send + Sync {
    /// Sends one magic packet for `info`.
    async fn wake(&self, info: &WakeOnLanInfo) -> WakeResult<()>;
}

/// [`WakeOnLan`] over a UDP broadcast socket.
#[derive(Debug, Clone)]
pub struct UdpWakeOnLan {
    target: IpAddr,
}

impl Default for UdpWakeOnLan {
    fn default() -> Self {
        Self {
            target: IpAddr::V4(Ipv4Addr::BROADCAST),
        }
    }
}

impl UdpWakeOnLan {
    /// Sends to a fixed address instead of the limited broadcast address.
    #[must_use]
    pub fn with_target(target: IpAddr) -> Self {
        Self { target }
    }
}

fn broadcast_socket() -> WakeResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| WakeError::Socket(e.to_string()))?;

    if let Err(e) = socket.set_broadcast(true) {
        log::warn!("[WakeOnLan] Failed to set SO_BROADCAST: {}", e);
    }

    socket
        .set_nonblocking(true)
        .map_err(|e| WakeError::Socket(e.to_string()))?;
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    socket
        .bind(&bind_addr.into())
        .map_err(|e| WakeError::Socket(e.to_string()))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(|e| WakeError::Socket(e.to_string()))
}

#[async_trait]
impl WakeOnLan for UdpWakeOnLan {
    async fn wake(&self, info: &WakeOnLanInfo) -> WakeResult<()> {
        let packet = magic_packet(&info.mac_address)?;
        let socket = broadcast_socket()?;
        let dest = SocketAddr::new(self.target, info.port);

        socket
            .send_to(&packet, dest)
            .await
            .map_err(|e| WakeError::Socket(format!("{dest}: {e}")))?;

        log::info!(
            "[WakeOnLan] Sent magic packet for {} to {}",
            info.mac_address,
            dest
        );
        Ok(())
    }
}
