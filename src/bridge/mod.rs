pub mod cache;
pub mod coordinator;
pub mod dispatch;
pub mod registry;
pub mod workers;

pub use cache::ResponseCache;
pub use coordinator::Coordinator;
pub use dispatch::{DispatchWorker, QueueClosed, RequestDispatcher};
pub use registry::{Completion, PendingRegistration, RegistryError, RequestRegistry};
pub use workers::{cache_sweeper, response_listener};
