//! Integration tests for the per-subscription stats view.

mod common;

use common::*;
use std::time::Duration;
use uuid::Uuid;
use webhook_relay::WebhookError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

#[tokio::test]
async fn test_stats_for_fresh_subscription() {
    let engine = test_engine();
    let created = engine
        .create_subscription(
            Uuid::new_v4(),
            subscription_request("https://example.com/hook", &["report.created"]),
        )
        .await
        .unwrap();

    let stats = engine.stats(created.subscription.id).await.unwrap();
    assert_eq!(stats.total_deliveries, 0);
    assert_eq!(stats.successful, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert!(stats.last_delivery_at.is_none());
}

#[tokio::test]
async fn test_stats_counts_mixed_outcomes() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .respond_with(CountingResponder::new())
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(CountingResponder::with_status(500))
        .mount(&mock_server)
        .await;

    let engine = test_engine();
    let org = Uuid::new_v4();
    let created = engine
        .create_subscription(
            org,
            subscription_request(&format!("{}/ok", mock_server.uri()), &["report.created"]),
        )
        .await
        .unwrap();
    let sub_id = created.subscription.id;

    // Three successful deliveries
    for n in 0..3 {
        engine.trigger(org, "report.created", serde_json::json!({"n": n}));
    }
    wait_for_deliveries(&engine, sub_id, 3, Duration::from_secs(2)).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let deliveries = engine.list_deliveries(sub_id, 100).await.unwrap();
        if deliveries.iter().filter(|d| d.status.is_terminal()).count() == 3 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "deliveries not terminal");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // One exhausted failure via the broken endpoint
    engine
        .update_subscription(
            sub_id,
            webhook_relay::UpdateSubscription {
                url: Some(format!("{}/broken", mock_server.uri())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    engine.trigger(org, "report.created", serde_json::json!({"n": 99}));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let deliveries = engine.list_deliveries(sub_id, 100).await.unwrap();
        if deliveries.iter().filter(|d| d.status.is_terminal()).count() == 4 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "failure not terminal");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let stats = engine.stats(sub_id).await.unwrap();
    assert_eq!(stats.total_deliveries, 4);
    assert_eq!(stats.successful, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retrying, 0);
    assert_eq!(stats.pending, 0);
    assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
    assert!(stats.last_delivery_at.is_some());
}

#[tokio::test]
async fn test_success_rate_ignores_in_flight_deliveries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CountingResponder::with_status(503))
        .mount(&mock_server)
        .await;

    // Long backoff keeps the record in `retrying` while we read stats
    let config = test_config().with_backoff(vec![Duration::from_secs(60)]);
    let engine = webhook_relay::WebhookEngine::in_memory(config).unwrap();
    let org = Uuid::new_v4();
    let created = engine
        .create_subscription(
            org,
            subscription_request(&mock_server.uri(), &["report.created"]),
        )
        .await
        .unwrap();

    engine.trigger(org, "report.created", serde_json::json!({}));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let stats = engine.stats(created.subscription.id).await.unwrap();
        if stats.retrying == 1 {
            assert_eq!(stats.total_deliveries, 1);
            assert_eq!(stats.successful, 0);
            assert_eq!(stats.failed, 0);
            // Nothing terminal yet, so no rate to report
            assert_eq!(stats.success_rate, 0.0);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no retrying record");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_stats_include_manual_test_deliveries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CountingResponder::new())
        .mount(&mock_server)
        .await;

    let engine = test_engine();
    let created = engine
        .create_subscription(
            Uuid::new_v4(),
            subscription_request(&mock_server.uri(), &["report.created"]),
        )
        .await
        .unwrap();

    engine.send_test(created.subscription.id).await.unwrap();

    let stats = engine.stats(created.subscription.id).await.unwrap();
    assert_eq!(stats.total_deliveries, 1);
    assert_eq!(stats.successful, 1);
    assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_stats_missing_subscription_is_not_found() {
    let engine = test_engine();
    let result = engine.stats(Uuid::new_v4()).await;
    assert!(matches!(
        result.unwrap_err(),
        WebhookError::SubscriptionNotFound
    ));
}
