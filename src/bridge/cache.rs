use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::messages::CachedResponse;

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
}

/// TTL-bounded store of completed responses keyed by request id.
///
/// A read past the TTL behaves as a miss and evicts the entry; the periodic
/// sweep removes expired entries that are never read again.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Look up a response. Expired entries are treated as absent and removed.
    pub fn get(&self, request_id: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        {
            let entry = self.entries.get(request_id)?;
            if now < entry.expires_at {
                return Some(entry.response.clone());
            }
        }
        // Expired; evict unless a fresh write replaced it in the meantime.
        self.entries
            .remove_if(request_id, |_, entry| entry.expires_at <= now);
        None
    }

    /// Insert or overwrite, restarting the TTL clock.
    pub fn store(&self, response: CachedResponse) {
        let request_id = response.request_id.clone();
        let entry = CacheEntry {
            response,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(request_id, entry);
    }

    /// Remove every entry whose expiry is at or before `now`.
    ///
    /// Returns how many entries were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for request_id in expired {
            if self
                .entries
                .remove_if(&request_id, |_, entry| entry.expires_at <= now)
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
