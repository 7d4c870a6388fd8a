pub mod bridge;
pub mod cli;
pub mod config;
pub mod emulator;
pub mod http;
pub mod messages;
pub mod runtime;
pub mod transport;

// Re-export key types for easy testing
pub use bridge::{Coordinator, RequestDispatcher, RequestRegistry, ResponseCache};
pub use config::BridgeConfig;
pub use messages::{BridgeRequest, CachedResponse, DispatchResult, PendingResult, WireMessage};
pub use runtime::Bridge;
pub use transport::{TransportError, UdpTransport};
