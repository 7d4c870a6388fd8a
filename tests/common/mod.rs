//! Common test utilities and helper modules
//!
//! Shared functionality for the integration tests: a recording UDP peer and
//! configuration builders pointed at loopback sockets.

// Not every test binary uses every helper.
#![allow(dead_code)]

pub mod recording_server;

use udp_bridge::config::BridgeConfig;

/// Bridge configuration aimed at a loopback UDP peer, with short timings
/// suitable for tests. Individual tests override fields as needed.
pub fn test_config(remote_port: u16) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.udp.remote_host = "127.0.0.1".to_string();
    config.udp.remote_port = remote_port;
    config.udp.local_port = 0;
    config.retry.attempt_timeout_ms = 100;
    config.retry.max_attempts = 3;
    config.retry.delay_between_attempts_ms = 0;
    config.cache.ttl_secs = 30;
    config.cache.cleanup_interval_secs = 5;
    config
}
