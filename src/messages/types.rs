use chrono::{DateTime, Utc};

/// A single logical request flowing through the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub request_id: String,
    pub payload: String,
}

impl BridgeRequest {
    /// Create a new request for the given correlation id
    pub fn new(request_id: String, payload: String) -> Self {
        Self {
            request_id,
            payload,
        }
    }
}

/// A completed reply, stamped with its arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub request_id: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(request_id: String, payload: String, received_at: DateTime<Utc>) -> Self {
        Self {
            request_id,
            payload,
            received_at,
        }
    }
}

/// Terminal outcome of a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingResult {
    /// A correlated reply arrived before retries were exhausted.
    Response(CachedResponse),
    /// Retries were exhausted without a reply.
    NoResponse,
}

impl PendingResult {
    /// Check if this outcome carries a response
    pub fn has_response(&self) -> bool {
        matches!(self, PendingResult::Response(_))
    }

    /// Consume the outcome, keeping the response if there is one
    pub fn into_response(self) -> Option<CachedResponse> {
        match self {
            PendingResult::Response(response) => Some(response),
            PendingResult::NoResponse => None,
        }
    }
}

/// The value handed back to the HTTP layer for one bridge call.
///
/// Exactly one of `is_timeout` or a populated payload holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub request_id: String,
    pub payload: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub is_timeout: bool,
    pub served_from_cache: bool,
}

impl DispatchResult {
    /// Result for a call whose wait expired without a reply
    pub fn timeout(request_id: String) -> Self {
        Self {
            request_id,
            payload: None,
            received_at: None,
            is_timeout: true,
            served_from_cache: false,
        }
    }

    /// Result served straight from the response cache
    pub fn from_cache(response: CachedResponse) -> Self {
        Self {
            request_id: response.request_id,
            payload: Some(response.payload),
            received_at: Some(response.received_at),
            is_timeout: false,
            served_from_cache: true,
        }
    }

    /// Result resolved by a live reply during this call's wait
    pub fn from_live(response: CachedResponse) -> Self {
        Self {
            request_id: response.request_id,
            payload: Some(response.payload),
            received_at: Some(response.received_at),
            is_timeout: false,
            served_from_cache: false,
        }
    }
}
