use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::registry::{Completion, RequestRegistry};
use crate::config::RetryConfig;
use crate::messages::{BridgeRequest, WireMessage};
use crate::transport::UdpTransport;

/// Error returned when the dispatch queue is no longer accepting work.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("dispatch queue is closed")]
pub struct QueueClosed;

#[derive(Debug)]
struct QueuedRequest {
    request: BridgeRequest,
    completion: Arc<Completion>,
}

/// Producer handle for the bounded dispatch queue.
///
/// `enqueue` suspends while the queue is full; callers bound the suspension
/// with their own deadline.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    queue: mpsc::Sender<QueuedRequest>,
}

impl RequestDispatcher {
    /// Build a dispatcher split into its producer handle and worker.
    pub fn new(
        registry: RequestRegistry,
        transport: Arc<UdpTransport>,
        retry: RetryConfig,
    ) -> (Self, DispatchWorker) {
        let (queue, backlog) = mpsc::channel(retry.queue_capacity);
        let worker = DispatchWorker {
            backlog,
            registry,
            transport,
            retry,
        };
        (Self { queue }, worker)
    }

    /// Queue an owned request for dispatch.
    pub async fn enqueue(
        &self,
        request: BridgeRequest,
        completion: Arc<Completion>,
    ) -> Result<(), QueueClosed> {
        self.queue
            .send(QueuedRequest { request, completion })
            .await
            .map_err(|_| QueueClosed)
    }
}

/// Consumer half of the dispatch queue: drains it sequentially and runs the
/// retry protocol for each owned request.
pub struct DispatchWorker {
    backlog: mpsc::Receiver<QueuedRequest>,
    registry: RequestRegistry,
    transport: Arc<UdpTransport>,
    retry: RetryConfig,
}

impl DispatchWorker {
    /// Drain the queue until the shutdown token fires or every producer is
    /// gone. Unread items are abandoned on shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let queued = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.backlog.recv() => match next {
                    Some(queued) => queued,
                    None => break,
                },
            };
            self.process(queued, &shutdown).await;
        }
        debug!("request dispatch worker stopped");
    }

    /// Run the retry protocol for one request.
    ///
    /// Sends up to `max_attempts` datagrams, racing each against the shared
    /// completion and the attempt timeout. Exhaustion resolves the registry
    /// entry with "no response"; a shutdown mid-request abandons it without
    /// resolving anything.
    async fn process(&self, queued: QueuedRequest, shutdown: &CancellationToken) {
        let QueuedRequest {
            request,
            completion,
        } = queued;

        if completion.is_complete() {
            // Satisfied while still queued; nothing to send.
            return;
        }

        let message = WireMessage::new(request.request_id.clone(), Some(request.payload.clone()));
        for attempt in 1..=self.retry.max_attempts {
            let sent = tokio::select! {
                _ = shutdown.cancelled() => return,
                sent = self.transport.send(&message) => sent,
            };
            if let Err(error) = sent {
                warn!(
                    request_id = %request.request_id,
                    attempt,
                    %error,
                    "failed to send UDP request"
                );
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = completion.wait() => return,
                _ = sleep(self.retry.attempt_timeout()) => {}
            }

            if attempt < self.retry.max_attempts && !self.retry.delay_between_attempts().is_zero()
            {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = sleep(self.retry.delay_between_attempts()) => {}
                }
            }
        }

        // Attempts exhausted; resolve so waiters stop blocking. A reply that
        // squeaked in first makes this a no-op.
        self.registry.try_complete_without_response(&request.request_id);
    }
}
