pub mod types;
pub mod wire;

pub use types::{BridgeRequest, CachedResponse, DispatchResult, PendingResult};
pub use wire::{WireMessage, MAX_DATAGRAM_SIZE};
