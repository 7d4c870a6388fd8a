use std::io;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::UdpEndpointConfig;
use crate::messages::{WireMessage, MAX_DATAGRAM_SIZE};

/// Errors surfaced by the UDP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind UDP socket on port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("failed to connect UDP socket to {remote}: {source}")]
    Connect { remote: String, source: io::Error },
    #[error("failed to encode wire message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("wire message of {size} bytes exceeds the single-datagram limit")]
    Oversized { size: usize },
    #[error("UDP send failed: {0}")]
    Send(#[source] io::Error),
    #[error("UDP receive failed: {0}")]
    Receive(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A well-formed reply datagram, stamped with its arrival time.
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    pub request_id: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// Connected UDP socket shared by the dispatch worker and the response
/// listener.
///
/// Sends are serialized against each other; receives have exactly one caller
/// (the listener loop) and do not block sends.
pub struct UdpTransport {
    socket: UdpSocket,
    send_lock: Mutex<()>,
    recv_buf: Mutex<Vec<u8>>,
}

impl UdpTransport {
    /// Bind the local socket and connect it to the remote endpoint.
    ///
    /// Failure here is fatal to startup; nothing else in the bridge can run
    /// without the socket.
    pub async fn connect(config: &UdpEndpointConfig) -> Result<Self> {
        let local = SocketAddr::from(([0, 0, 0, 0], config.local_port));
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind {
                port: config.local_port,
                source,
            })?;

        let remote = config.remote_addr();
        socket
            .connect(&remote)
            .await
            .map_err(|source| TransportError::Connect {
                remote: remote.clone(),
                source,
            })?;

        if let Ok(addr) = socket.local_addr() {
            debug!(local = %addr, remote = %remote, "UDP transport connected");
        }

        Ok(Self {
            socket,
            send_lock: Mutex::new(()),
            recv_buf: Mutex::new(vec![0u8; MAX_DATAGRAM_SIZE]),
        })
    }

    /// Local address of the connected socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serialize one envelope and send it as a single datagram.
    pub async fn send(&self, message: &WireMessage) -> Result<()> {
        let bytes = message.to_bytes()?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::Oversized { size: bytes.len() });
        }

        let _guard = self.send_lock.lock().await;
        self.socket.send(&bytes).await.map_err(TransportError::Send)?;
        Ok(())
    }

    /// Wait for the next well-formed reply.
    ///
    /// Malformed datagrams and blank request ids are dropped with a warning
    /// and the wait continues; they must never stall or crash the listener.
    pub async fn recv(&self) -> Result<ReceivedPacket> {
        let mut buf = self.recv_buf.lock().await;
        loop {
            let len = self
                .socket
                .recv(&mut buf)
                .await
                .map_err(TransportError::Receive)?;

            match WireMessage::parse(&buf[..len]) {
                Some(message) => {
                    return Ok(ReceivedPacket {
                        request_id: message.request_id,
                        payload: message.payload.unwrap_or_default(),
                        received_at: Utc::now(),
                    });
                }
                None => {
                    warn!(len, "ignoring malformed UDP datagram");
                }
            }
        }
    }
}
