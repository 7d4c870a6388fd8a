use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bridge::{
    cache_sweeper, response_listener, Coordinator, RequestDispatcher, RequestRegistry,
    ResponseCache,
};
use crate::config::BridgeConfig;
use crate::transport::{Result, UdpTransport};

/// A running bridge core: connected transport, registry, cache and the three
/// background workers, stopped together through one shutdown token.
pub struct Bridge {
    coordinator: Arc<Coordinator>,
    cache: ResponseCache,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Construct the transport and start the background workers.
    ///
    /// Transport bind/connect failure is the one fatal startup error and the
    /// only error surfaced here.
    pub async fn start(config: &BridgeConfig) -> Result<Self> {
        let transport = Arc::new(UdpTransport::connect(&config.udp).await?);
        let registry = RequestRegistry::new();
        let cache = ResponseCache::new(config.cache.ttl());
        let (dispatcher, worker) = RequestDispatcher::new(
            registry.clone(),
            Arc::clone(&transport),
            config.retry.clone(),
        );
        let coordinator = Arc::new(Coordinator::new(
            registry.clone(),
            cache.clone(),
            dispatcher,
        ));

        let shutdown = CancellationToken::new();
        let workers = vec![
            tokio::spawn(worker.run(shutdown.clone())),
            tokio::spawn(response_listener(
                Arc::clone(&transport),
                registry,
                cache.clone(),
                shutdown.clone(),
            )),
            tokio::spawn(cache_sweeper(
                cache.clone(),
                config.cache.cleanup_interval(),
                shutdown.clone(),
            )),
        ];

        info!(remote = %config.udp.remote_addr(), "bridge started");
        Ok(Self {
            coordinator,
            cache,
            shutdown,
            workers,
        })
    }

    /// Handle used by the HTTP layer to dispatch calls
    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Handle to the shared response cache
    pub fn cache(&self) -> ResponseCache {
        self.cache.clone()
    }

    /// Stop the background workers and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("bridge stopped");
    }
}
