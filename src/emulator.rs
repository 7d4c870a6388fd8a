use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EmulatorConfig;
use crate::messages::{WireMessage, MAX_DATAGRAM_SIZE};
use crate::transport::{Result, TransportError};

/// Stand-in for the remote UDP service: echoes each request back with a
/// configurable prefix after a random delay.
pub struct UdpEmulator {
    socket: UdpSocket,
    config: EmulatorConfig,
}

impl UdpEmulator {
    /// Bind the emulator socket on the configured port.
    pub async fn bind(config: EmulatorConfig) -> Result<Self> {
        let port = config.listen_port;
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|source| TransportError::Bind { port, source })?;
        info!(port, "UDP emulator listening");
        Ok(Self { socket, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Receive)
    }

    /// Serve requests until the token is cancelled.
    ///
    /// Requests are handled one at a time; the delay is part of the emulated
    /// service's behavior, not an artifact of concurrency.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, sender) = tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(error) => {
                        warn!(%error, "emulator receive failed");
                        continue;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("UDP emulator stopping");
                    return;
                }
            };

            let Some(message) = WireMessage::parse(&buf[..len]) else {
                warn!(len, "ignoring malformed UDP payload");
                continue;
            };

            let delay = self.response_delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => {
                        info!("UDP emulator stopping");
                        return;
                    }
                }
            }

            let reply = WireMessage::new(
                message.request_id.clone(),
                Some(format!(
                    "{}{}",
                    self.config.response_prefix,
                    message.payload.unwrap_or_default()
                )),
            );
            let encoded = match reply.to_bytes() {
                Ok(encoded) => encoded,
                Err(error) => {
                    warn!(%error, "failed to encode emulator reply");
                    continue;
                }
            };
            match self.socket.send_to(&encoded, sender).await {
                Ok(_) => debug!(
                    request_id = %message.request_id,
                    delay_ms = delay.as_millis() as u64,
                    "emulator replied"
                ),
                Err(error) => warn!(%error, "failed to send emulator reply"),
            }
        }
    }

    fn response_delay(&self) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);
        if max == 0 {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(millis)
    }
}
