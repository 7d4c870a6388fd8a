use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use udp_bridge::messages::WireMessage;

/// A record of one well-formed envelope the server received.
#[derive(Debug, Clone)]
pub struct ReceivedEnvelope {
    pub message: WireMessage,
    pub sender: SocketAddr,
}

/// Loopback UDP peer that records every well-formed envelope it receives.
///
/// It never replies on its own; tests inject replies explicitly so the exact
/// send counts and orderings stay under test control.
pub struct RecordingUdpServer {
    socket: Arc<UdpSocket>,
    received: Arc<Mutex<Vec<ReceivedEnvelope>>>,
    listener: JoinHandle<()>,
}

impl RecordingUdpServer {
    pub async fn start() -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let received: Arc<Mutex<Vec<ReceivedEnvelope>>> = Arc::new(Mutex::new(Vec::new()));

        let recv_socket = Arc::clone(&socket);
        let recv_log = Arc::clone(&received);
        let listener = tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let Ok((len, sender)) = recv_socket.recv_from(&mut buf).await else {
                    return;
                };
                if let Some(message) = WireMessage::parse(&buf[..len]) {
                    recv_log.lock().await.push(ReceivedEnvelope { message, sender });
                }
            }
        });

        Self {
            socket,
            received,
            listener,
        }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Snapshot of everything received so far.
    pub async fn received(&self) -> Vec<ReceivedEnvelope> {
        self.received.lock().await.clone()
    }

    /// Wait until at least `count` envelopes have arrived.
    ///
    /// Panics when the deadline passes first; the current tally goes into the
    /// panic message.
    pub async fn wait_for_envelopes(&self, count: usize, deadline: Duration) -> Vec<ReceivedEnvelope> {
        let give_up = tokio::time::Instant::now() + deadline;
        loop {
            let snapshot = self.received().await;
            if snapshot.len() >= count {
                return snapshot;
            }
            if tokio::time::Instant::now() >= give_up {
                panic!(
                    "expected at least {} envelopes, got {} before the deadline",
                    count,
                    snapshot.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Send a reply envelope to the sender of a previously received request.
    pub async fn reply(&self, to: &ReceivedEnvelope, payload: &str) {
        let reply = WireMessage::new(to.message.request_id.clone(), Some(payload.to_string()));
        self.socket
            .send_to(&reply.to_bytes().unwrap(), to.sender)
            .await
            .unwrap();
    }
}

impl Drop for RecordingUdpServer {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
