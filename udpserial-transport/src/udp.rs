//! UDP endpoints

use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{UdpSocket, lookup_host};
use udpserial_core::{PortSpec, UdpSerialError, UdpSerialResult};

/// Largest datagram read from the listen socket
pub const MAX_DATAGRAM_SIZE: usize = 5100;

/// Addresses of the two UDP endpoints of a bridge
#[derive(Debug, Clone)]
pub struct UdpSettings {
    /// Datagrams arriving here are written to the serial device
    pub listen_address: String,
    /// Serial frames are sent here
    pub destination_address: String,
}

impl UdpSettings {
    pub fn new(listen_address: String, destination_address: String) -> Self {
        Self {
            listen_address,
            destination_address,
        }
    }

    pub fn for_port(spec: &PortSpec) -> Self {
        Self::new(spec.listen_address(), spec.destination_address())
    }
}

/// Destination of serial→network frames
#[async_trait]
pub trait DatagramSink: Send + Sync {
    /// Send one datagram
    async fn send(&self, datagram: &[u8]) -> std::io::Result<usize>;
}

#[async_trait]
impl DatagramSink for UdpSocket {
    async fn send(&self, datagram: &[u8]) -> std::io::Result<usize> {
        UdpSocket::send(self, datagram).await
    }
}

/// Opened UDP sockets of a bridge
pub struct UdpEndpoints {
    /// Socket bound to the listen address
    pub receiver: UdpSocket,
    /// Socket connected to the destination address
    pub sender: Arc<dyn DatagramSink>,
}

impl UdpEndpoints {
    /// Bind the receive socket and connect the send socket
    ///
    /// Host names are resolved here, so a `localhost` listen address is valid.
    ///
    /// # Errors
    /// Returns `Open` if either address cannot be resolved, bound or connected
    pub async fn open(settings: &UdpSettings) -> UdpSerialResult<Self> {
        let receiver = UdpSocket::bind(&settings.listen_address)
            .await
            .map_err(|e| UdpSerialError::open(&settings.listen_address, e))?;
        log::info!("Listening on {}", settings.listen_address);

        let destination = resolve(&settings.destination_address).await?;
        let local: SocketAddr = if destination.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let sender = UdpSocket::bind(local)
            .await
            .map_err(|e| UdpSerialError::open(&settings.destination_address, e))?;
        sender
            .connect(destination)
            .await
            .map_err(|e| UdpSerialError::open(&settings.destination_address, e))?;
        log::info!("Sending to {}", settings.destination_address);

        Ok(Self {
            receiver,
            sender: Arc::new(sender),
        })
    }
}

async fn resolve(address: &str) -> UdpSerialResult<SocketAddr> {
    lookup_host(address)
        .await
        .map_err(|e| UdpSerialError::open(address, e))?
        .next()
        .ok_or_else(|| UdpSerialError::open(address, "address resolved to nothing"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_and_exchange() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let settings = UdpSettings::new(
            "127.0.0.1:0".to_string(),
            peer.local_addr().unwrap().to_string(),
        );
        let endpoints = UdpEndpoints::open(&settings).await.unwrap();

        endpoints.sender.send(b"frame").await.unwrap();
        let mut buf = [0u8; 16];
        let (n, _) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"frame");

        let listen = endpoints.receiver.local_addr().unwrap();
        peer.send_to(b"datagram", listen).await.unwrap();
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (n, _) = endpoints.receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"datagram");
    }

    #[tokio::test]
    async fn test_localhost_listen_address_resolves() {
        let settings = UdpSettings::new("localhost:0".to_string(), "127.0.0.1:9".to_string());
        assert!(UdpEndpoints::open(&settings).await.is_ok());
    }

    #[tokio::test]
    async fn test_unresolvable_destination() {
        let settings = UdpSettings::new(
            "127.0.0.1:0".to_string(),
            "no-such-host.invalid:7001".to_string(),
        );
        assert!(matches!(
            UdpEndpoints::open(&settings).await,
            Err(UdpSerialError::Open { .. })
        ));
    }

    #[tokio::test]
    async fn test_listen_address_in_use() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let settings = UdpSettings::new(
            taken.local_addr().unwrap().to_string(),
            "127.0.0.1:9".to_string(),
        );
        assert!(matches!(
            UdpEndpoints::open(&settings).await,
            Err(UdpSerialError::Open { .. })
        ));
    }
}
