use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::types::Address;
use crate::{Error, Result};

/// UDP port the unit broadcasts its announcement to.
pub const DISCOVERY_PORT: u16 = 50000;
pub const DISCOVERY_MAGIC: &[u8; 18] = b"Rinnai_NBW2_Module";
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(5000);

const PORT_OFFSET: usize = 32;

/// Extract the unit's TCP address from an announcement datagram.
pub fn parse_announcement(payload: &[u8], source: SocketAddr) -> Option<Address> {
    if !payload.starts_with(DISCOVERY_MAGIC) || payload.len() < PORT_OFFSET + 2 {
        return None;
    }
    let port = u16::from_be_bytes([payload[PORT_OFFSET], payload[PORT_OFFSET + 1]]);
    Some(Address::new(source.ip(), port))
}

/// Listen on the well-known discovery port for the unit's broadcast.
pub async fn resolve_address(timeout: Duration) -> Result<Address> {
    resolve_address_on(DISCOVERY_PORT, timeout).await
}

pub async fn resolve_address_on(port: u16, timeout: Duration) -> Result<Address> {
    debug!(port, ?timeout, "listening for unit announcement");
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .map_err(Error::DiscoverySocket)?;

    let listen = async {
        let mut buf = [0u8; 512];
        loop {
            let (len, source) = socket
                .recv_from(&mut buf)
                .await
                .map_err(Error::DiscoverySocket)?;
            match parse_announcement(&buf[..len], source) {
                Some(address) => return Ok(address),
                None => trace!(%source, len, "ignoring datagram"),
            }
        }
    };

    let result = match tokio::time::timeout(timeout, listen).await {
        Ok(result) => result,
        Err(_) => Err(Error::DiscoveryTimeout),
    };
    if let Ok(address) = &result {
        debug!(%address, "unit discovered");
    }
    result
}
