mod common;

use std::time::Duration;

use udp_bridge::messages::BridgeRequest;
use udp_bridge::runtime::Bridge;

use common::recording_server::RecordingUdpServer;
use common::test_config;

#[tokio::test]
async fn exhausted_retries_send_exactly_max_attempts() {
    let server = RecordingUdpServer::start().await;
    let mut config = test_config(server.port());
    config.retry.attempt_timeout_ms = 20;
    config.retry.max_attempts = 3;

    let bridge = Bridge::start(&config).await.unwrap();
    let coordinator = bridge.coordinator();

    let request = BridgeRequest::new("req-retries".to_string(), "ping".to_string());
    let result = coordinator
        .dispatch(request, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(result.is_timeout);
    assert_eq!(result.payload, None);

    let envelopes = server.wait_for_envelopes(3, Duration::from_secs(1)).await;
    for envelope in &envelopes {
        assert_eq!(envelope.message.request_id, "req-retries");
        assert_eq!(envelope.message.payload.as_deref(), Some("ping"));
    }

    // No fourth attempt follows once the budget is spent.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received().await.len(), 3);

    bridge.shutdown().await;
}

#[tokio::test]
async fn concurrent_dispatches_share_one_flight() {
    let server = RecordingUdpServer::start().await;
    let mut config = test_config(server.port());
    config.retry.attempt_timeout_ms = 500;
    config.retry.max_attempts = 3;

    let bridge = Bridge::start(&config).await.unwrap();
    let coordinator = bridge.coordinator();

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .dispatch(
                    BridgeRequest::new("req-shared".to_string(), "ping".to_string()),
                    Duration::from_secs(2),
                )
                .await
                .unwrap()
        })
    };
    // The owner's datagram reaches the wire before the second caller arrives.
    let envelopes = server.wait_for_envelopes(1, Duration::from_secs(1)).await;

    let second = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .dispatch(
                    BridgeRequest::new("req-shared".to_string(), "ping".to_string()),
                    Duration::from_secs(2),
                )
                .await
                .unwrap()
        })
    };
    // Let the second caller join the pending entry, then resolve it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.reply(&envelopes[0], "pong").await;

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert!(!first.is_timeout);
    assert!(!second.is_timeout);
    assert_eq!(first.payload.as_deref(), Some("pong"));
    assert_eq!(second.payload.as_deref(), Some("pong"));

    // One in-flight attempt served both callers.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received().await.len(), 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn reply_to_the_first_attempt_stops_the_retry_sequence() {
    let server = RecordingUdpServer::start().await;
    let mut config = test_config(server.port());
    config.retry.attempt_timeout_ms = 150;
    config.retry.max_attempts = 5;

    let bridge = Bridge::start(&config).await.unwrap();
    let coordinator = bridge.coordinator();

    let call = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .dispatch(
                    BridgeRequest::new("req-once".to_string(), "ping".to_string()),
                    Duration::from_secs(2),
                )
                .await
                .unwrap()
        })
    };

    let envelopes = server.wait_for_envelopes(1, Duration::from_secs(1)).await;
    server.reply(&envelopes[0], "pong").await;

    let result = call.await.unwrap();
    assert!(!result.is_timeout);
    assert_eq!(result.payload.as_deref(), Some("pong"));

    // The remaining attempt budget is not spent after the reply.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.received().await.len(), 1);

    bridge.shutdown().await;
}
