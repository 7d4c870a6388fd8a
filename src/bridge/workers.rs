use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::bridge::cache::ResponseCache;
use crate::bridge::registry::RequestRegistry;
use crate::messages::CachedResponse;
use crate::transport::UdpTransport;

/// Pause before retrying after a transport receive error.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Drain replies from the transport until the shutdown token fires.
///
/// Each reply is stored in the cache before the registry entry is completed,
/// so a caller whose wait lapses a moment earlier can still find the answer
/// on its next poll.
pub async fn response_listener(
    transport: Arc<UdpTransport>,
    registry: RequestRegistry,
    cache: ResponseCache,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = transport.recv() => received,
        };
        match received {
            Ok(packet) => {
                debug!(request_id = %packet.request_id, "received UDP reply");
                let response = CachedResponse::new(
                    packet.request_id,
                    packet.payload,
                    packet.received_at,
                );
                let request_id = response.request_id.clone();
                cache.store(response.clone());
                registry.try_complete_with_response(&request_id, response);
            }
            Err(error) => {
                error!(%error, "UDP receive loop failed; retrying shortly");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(RECEIVE_RETRY_DELAY) => {}
                }
            }
        }
    }
    debug!("response listener stopped");
}

/// Sweep expired cache entries every `period` until the shutdown token fires.
pub async fn cache_sweeper(cache: ResponseCache, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = cache.sweep(Instant::now());
                if removed > 0 {
                    debug!(removed, "removed expired response cache entries");
                }
            }
        }
    }
    debug!("cache sweeper stopped");
}
