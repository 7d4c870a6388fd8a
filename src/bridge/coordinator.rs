use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::bridge::cache::ResponseCache;
use crate::bridge::dispatch::RequestDispatcher;
use crate::bridge::registry::{RegistryError, RequestRegistry};
use crate::messages::{BridgeRequest, DispatchResult, PendingResult};

/// Per-call orchestration across cache, registry and dispatcher.
pub struct Coordinator {
    registry: RequestRegistry,
    cache: ResponseCache,
    dispatcher: RequestDispatcher,
}

impl Coordinator {
    pub fn new(
        registry: RequestRegistry,
        cache: ResponseCache,
        dispatcher: RequestDispatcher,
    ) -> Self {
        Self {
            registry,
            cache,
            dispatcher,
        }
    }

    /// Resolve one bridge call.
    ///
    /// A cached answer returns immediately. Otherwise the call joins or
    /// starts the single-flight dispatch for its id and waits up to
    /// `call_timeout`. An expired wait abandons only this caller; the
    /// underlying retry workflow keeps running and may still populate the
    /// cache for later observers.
    pub async fn dispatch(
        &self,
        request: BridgeRequest,
        call_timeout: Duration,
    ) -> Result<DispatchResult, RegistryError> {
        let request_id = request.request_id.clone();

        if let Some(cached) = self.cache.get(&request_id) {
            debug!(request_id = %request_id, "served from cache");
            return Ok(DispatchResult::from_cache(cached));
        }

        let registration = self.registry.register(&request_id)?;
        let deadline = Instant::now() + call_timeout;

        if registration.is_owner() {
            let enqueued = timeout_at(
                deadline,
                self.dispatcher.enqueue(request, registration.completion()),
            )
            .await;
            match enqueued {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    // Queue closed or full past the deadline. Resolve so
                    // joiners are not left waiting on work that never starts.
                    self.registry.try_complete_without_response(&request_id);
                    return Ok(DispatchResult::timeout(request_id));
                }
            }
        }

        match timeout_at(deadline, registration.wait()).await {
            Ok(PendingResult::Response(response)) => Ok(DispatchResult::from_live(response)),
            Ok(PendingResult::NoResponse) => Ok(DispatchResult::timeout(request_id)),
            Err(_) => {
                debug!(
                    request_id = %request_id,
                    "caller deadline expired while the request is still in flight"
                );
                Ok(DispatchResult::timeout(request_id))
            }
        }
        // Dropping the registration releases this caller's waiter slot on
        // every path out of this function.
    }
}
