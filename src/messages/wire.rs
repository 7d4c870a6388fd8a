use serde::{Deserialize, Serialize};

// Wire protocol constants
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024; // single-datagram ceiling for the envelope

/// The JSON envelope exchanged over UDP in both directions.
///
/// One envelope per datagram: `{"requestId": string, "payload": string|null}`.
/// Requests carry the bridged payload; replies carry the answer under the
/// same request id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub request_id: String,
    #[serde(default)]
    pub payload: Option<String>,
}

impl WireMessage {
    pub fn new(request_id: String, payload: Option<String>) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Serialize to the single-datagram JSON form
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse a received datagram.
    ///
    /// Returns `None` for malformed JSON or a blank request id; such
    /// datagrams are dropped by the caller without an error.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let message: WireMessage = serde_json::from_slice(bytes).ok()?;
        if message.request_id.trim().is_empty() {
            return None;
        }
        Some(message)
    }
}
