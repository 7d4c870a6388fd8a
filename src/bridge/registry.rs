use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Notify;

use crate::messages::{CachedResponse, PendingResult};

/// Errors surfaced by the pending request registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("request id must not be empty")]
    EmptyRequestId,
}

/// Exactly-once completion cell shared by every waiter on a request id.
///
/// The first `try_complete` wins; later calls observe `false`. Waiters park
/// on the `Notify` and re-check the cell, so a resolution landing between the
/// check and the park is never missed.
#[derive(Debug, Default)]
pub struct Completion {
    result: OnceLock<PendingResult>,
    notify: Notify,
}

impl Completion {
    /// Resolve the cell. Returns whether this call performed the resolution.
    pub fn try_complete(&self, result: PendingResult) -> bool {
        let applied = self.result.set(result).is_ok();
        if applied {
            self.notify.notify_waiters();
        }
        applied
    }

    /// Whether the cell has resolved
    pub fn is_complete(&self) -> bool {
        self.result.get().is_some()
    }

    /// Wait until the cell resolves and return the shared result.
    pub async fn wait(&self) -> PendingResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register for the next notify_waiters before the re-check.
            notified.as_mut().enable();
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
struct PendingEntry {
    completion: Arc<Completion>,
    waiters: AtomicUsize,
}

impl PendingEntry {
    fn new() -> Self {
        Self {
            completion: Arc::new(Completion::default()),
            waiters: AtomicUsize::new(1),
        }
    }

    fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    fn add_waiter(&self) {
        self.waiters.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_waiter(&self) {
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Single-flight registry of in-flight request ids.
///
/// The first `register` call for an id owns the dispatch; concurrent calls
/// for the same id join the owner's completion. An entry is purged once it
/// has resolved and its last registration is gone, so "resolve" and "final
/// release" may happen in either order.
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    entries: Arc<DashMap<String, Arc<PendingEntry>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in a request id.
    ///
    /// Returns an owner registration when no live entry exists, otherwise a
    /// joiner sharing the existing completion. An entry that already resolved
    /// but has not been purged yet is replaced rather than joined: a joiner
    /// must never come back holding a finished handle for a doomed entry.
    pub fn register(&self, request_id: &str) -> Result<PendingRegistration, RegistryError> {
        if request_id.trim().is_empty() {
            return Err(RegistryError::EmptyRequestId);
        }

        loop {
            match self.entries.entry(request_id.to_string()) {
                Entry::Occupied(occupied) => {
                    let entry = Arc::clone(occupied.get());
                    if entry.completion.is_complete() {
                        // Resolved leftover awaiting purge; replace it.
                        occupied.remove();
                        continue;
                    }
                    entry.add_waiter();
                    if entry.completion.is_complete() {
                        // Resolution raced the join. Back out and retry.
                        entry.remove_waiter();
                        if entry.waiters() == 0 {
                            occupied.remove();
                        }
                        continue;
                    }
                    return Ok(self.registration(request_id, entry, false));
                }
                Entry::Vacant(vacant) => {
                    let entry = Arc::new(PendingEntry::new());
                    vacant.insert(Arc::clone(&entry));
                    return Ok(self.registration(request_id, entry, true));
                }
            }
        }
    }

    /// Resolve an entry with a received response.
    ///
    /// Returns whether this call performed the resolution; `false` when the
    /// id is unknown or another resolver won.
    pub fn try_complete_with_response(&self, request_id: &str, response: CachedResponse) -> bool {
        self.try_complete(request_id, PendingResult::Response(response))
    }

    /// Resolve an entry with the no-response sentinel, used when retries are
    /// exhausted.
    pub fn try_complete_without_response(&self, request_id: &str) -> bool {
        self.try_complete(request_id, PendingResult::NoResponse)
    }

    /// Number of live entries. Intended for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn registration(
        &self,
        request_id: &str,
        entry: Arc<PendingEntry>,
        is_owner: bool,
    ) -> PendingRegistration {
        PendingRegistration {
            request_id: request_id.to_string(),
            registry: self.clone(),
            entry,
            is_owner,
        }
    }

    fn try_complete(&self, request_id: &str, result: PendingResult) -> bool {
        let Some(entry) = self
            .entries
            .get(request_id)
            .map(|current| Arc::clone(current.value()))
        else {
            return false;
        };
        let applied = entry.completion.try_complete(result);
        self.purge_if_settled(request_id, &entry);
        applied
    }

    fn release(&self, request_id: &str, entry: &Arc<PendingEntry>) {
        let Some(current) = self
            .entries
            .get(request_id)
            .map(|current| Arc::clone(current.value()))
        else {
            return;
        };
        if !Arc::ptr_eq(&current, entry) {
            // Stale registration for an entry that was already replaced.
            return;
        }
        entry.remove_waiter();
        self.purge_if_settled(request_id, entry);
    }

    // Removal requires both: resolved, and nobody left to observe the entry.
    fn purge_if_settled(&self, request_id: &str, entry: &Arc<PendingEntry>) {
        if !entry.completion.is_complete() || entry.waiters() > 0 {
            return;
        }
        self.entries
            .remove_if(request_id, |_, current| Arc::ptr_eq(current, entry));
    }
}

/// A caller's stake in a pending request id.
///
/// Dropping the registration releases the waiter slot; the entry is purged
/// once it has resolved and the last registration is gone.
#[derive(Debug)]
pub struct PendingRegistration {
    request_id: String,
    registry: RequestRegistry,
    entry: Arc<PendingEntry>,
    is_owner: bool,
}

impl PendingRegistration {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Whether this registration was first for its id and owns the dispatch
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Completion handle shared by every registration for this id
    pub fn completion(&self) -> Arc<Completion> {
        Arc::clone(&self.entry.completion)
    }

    /// Wait until the entry resolves.
    pub async fn wait(&self) -> PendingResult {
        self.entry.completion.wait().await
    }
}

impl Drop for PendingRegistration {
    fn drop(&mut self) {
        self.registry.release(&self.request_id, &self.entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn response(request_id: &str, payload: &str) -> CachedResponse {
        CachedResponse::new(request_id.to_string(), payload.to_string(), Utc::now())
    }

    #[test]
    fn first_register_owns_the_dispatch() {
        let registry = RequestRegistry::new();
        let registration = registry.register("req-1").unwrap();
        assert!(registration.is_owner());
        assert_eq!(registration.request_id(), "req-1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_request_id_is_rejected() {
        let registry = RequestRegistry::new();
        assert_eq!(
            registry.register("").unwrap_err(),
            RegistryError::EmptyRequestId
        );
        assert_eq!(
            registry.register("   ").unwrap_err(),
            RegistryError::EmptyRequestId
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_register_joins_without_owning() {
        let registry = RequestRegistry::new();
        let owner = registry.register("req-2").unwrap();
        let joiner = registry.register("req-2").unwrap();
        assert!(owner.is_owner());
        assert!(!joiner.is_owner());
        // One entry, shared completion.
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&owner.completion(), &joiner.completion()));
    }

    #[tokio::test]
    async fn all_waiters_observe_the_same_resolution() {
        let registry = RequestRegistry::new();
        let owner = registry.register("req-3").unwrap();
        let joiner = registry.register("req-3").unwrap();

        assert!(registry.try_complete_with_response("req-3", response("req-3", "pong")));

        let owner_result = timeout(Duration::from_secs(1), owner.wait()).await.unwrap();
        let joiner_result = timeout(Duration::from_secs(1), joiner.wait()).await.unwrap();
        assert_eq!(owner_result, joiner_result);
        assert_eq!(
            owner_result.into_response().map(|r| r.payload),
            Some("pong".to_string())
        );
    }

    #[test]
    fn resolution_applies_exactly_once() {
        let registry = RequestRegistry::new();
        let registration = registry.register("req-4").unwrap();

        assert!(registry.try_complete_with_response("req-4", response("req-4", "first")));
        assert!(!registry.try_complete_with_response("req-4", response("req-4", "second")));
        assert!(!registry.try_complete_without_response("req-4"));

        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn completing_an_unknown_id_is_not_applied() {
        let registry = RequestRegistry::new();
        assert!(!registry.try_complete_without_response("missing"));
        assert!(!registry.try_complete_with_response("missing", response("missing", "x")));
    }

    #[test]
    fn entry_outlives_release_until_resolved() {
        let registry = RequestRegistry::new();
        let registration = registry.register("req-5").unwrap();
        drop(registration);
        // Unresolved entries stay claimed so a second dispatch cannot start
        // for the same id while the first attempt sequence is still running.
        assert_eq!(registry.len(), 1);

        assert!(registry.try_complete_without_response("req-5"));
        assert!(registry.is_empty());
    }

    #[test]
    fn resolution_with_live_waiters_defers_purge_to_last_release() {
        let registry = RequestRegistry::new();
        let owner = registry.register("req-6").unwrap();
        let joiner = registry.register("req-6").unwrap();

        assert!(registry.try_complete_without_response("req-6"));
        assert_eq!(registry.len(), 1);

        drop(owner);
        assert_eq!(registry.len(), 1);
        drop(joiner);
        assert!(registry.is_empty());
    }

    #[test]
    fn register_replaces_a_resolved_leftover() {
        let registry = RequestRegistry::new();
        let stale = registry.register("req-7").unwrap();
        assert!(registry.try_complete_without_response("req-7"));
        // Entry still present because `stale` holds a waiter slot.
        assert_eq!(registry.len(), 1);

        let fresh = registry.register("req-7").unwrap();
        assert!(fresh.is_owner());
        assert!(!fresh.completion().is_complete());

        // Releasing the stale registration must not disturb the new entry.
        drop(stale);
        assert_eq!(registry.len(), 1);
        assert!(!fresh.completion().is_complete());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_resolved() {
        let registry = RequestRegistry::new();
        let registration = registry.register("req-8").unwrap();
        assert!(registry.try_complete_with_response("req-8", response("req-8", "early")));

        let result = timeout(Duration::from_millis(50), registration.wait())
            .await
            .unwrap();
        assert!(result.has_response());
    }

    #[test]
    fn many_registrations_share_one_owner() {
        let registry = RequestRegistry::new();
        let registrations: Vec<_> = (0..32)
            .map(|_| registry.register("req-9").unwrap())
            .collect();
        let owners = registrations.iter().filter(|r| r.is_owner()).count();
        assert_eq!(owners, 1);
        assert_eq!(registry.len(), 1);

        assert!(registry.try_complete_without_response("req-9"));
        drop(registrations);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn concurrent_waiters_all_wake() {
        let registry = RequestRegistry::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(9));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                let registration = registry.register("req-10").unwrap();
                barrier.wait().await;
                registration.wait().await
            }));
        }

        // Resolve only after every task holds its registration.
        barrier.wait().await;
        registry.try_complete_with_response("req-10", response("req-10", "shared"));

        for handle in handles {
            let result = timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                result.into_response().map(|r| r.payload),
                Some("shared".to_string())
            );
        }
        assert!(registry.is_empty());
    }
}
