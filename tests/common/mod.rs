//! Common test utilities for webhook-relay integration tests.
//!
//! Provides mock-server responders, engine fixtures with millisecond
//! backoff tables, and polling helpers for the async delivery path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use webhook_relay::{
    CreateSubscription, DeliveryAttempt, DeliveryStatus, EngineConfig, WebhookEngine,
};

// ---------------------------------------------------------------------------
// Engine fixtures
// ---------------------------------------------------------------------------

static TRACING: Once = Once::new();

/// Initialize tracing output for tests. Visible with `--nocapture`; filter
/// with `RUST_LOG` (e.g. `RUST_LOG=webhook_delivery=debug`).
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Engine configuration for tests: loopback destinations allowed, short
/// timeouts, and a millisecond backoff table so retry chains resolve fast.
pub fn test_config() -> EngineConfig {
    init_tracing();
    EngineConfig::new(vec![0x42u8; 32])
        .with_private_networks_allowed()
        .with_request_timeout(Duration::from_millis(500))
        .with_backoff(vec![
            Duration::from_millis(50),
            Duration::from_millis(50),
            Duration::from_millis(50),
        ])
}

/// An in-memory engine with the test configuration.
pub fn test_engine() -> WebhookEngine {
    WebhookEngine::in_memory(test_config()).expect("failed to build engine")
}

/// A minimal create-subscription request for the given URL and events.
pub fn subscription_request(url: &str, events: &[&str]) -> CreateSubscription {
    CreateSubscription {
        name: "test subscription".to_string(),
        url: url.to_string(),
        events: events.iter().map(|e| (*e).to_string()).collect(),
        description: None,
        headers: HashMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Polling helpers
// ---------------------------------------------------------------------------

/// Poll until a subscription has at least `min` delivery records, or panic
/// after `timeout`.
pub async fn wait_for_deliveries(
    engine: &WebhookEngine,
    subscription_id: Uuid,
    min: usize,
    timeout: Duration,
) -> Vec<DeliveryAttempt> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let deliveries = engine
            .list_deliveries(subscription_id, 100)
            .await
            .expect("list_deliveries failed");
        if deliveries.len() >= min {
            return deliveries;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "timed out waiting for {min} deliveries, have {}",
                deliveries.len()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until a subscription's single delivery record reaches a terminal
/// state, or panic after `timeout`.
pub async fn wait_for_terminal(
    engine: &WebhookEngine,
    subscription_id: Uuid,
    timeout: Duration,
) -> DeliveryAttempt {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let deliveries = engine
            .list_deliveries(subscription_id, 100)
            .await
            .expect("list_deliveries failed");
        if let Some(attempt) = deliveries.iter().find(|d| d.status.is_terminal()) {
            return attempt.clone();
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "timed out waiting for a terminal delivery, current: {:?}",
                deliveries
                    .iter()
                    .map(|d| d.status)
                    .collect::<Vec<DeliveryStatus>>()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            timestamp: Utc::now(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// CountingResponder - counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Create a new counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a counting responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    /// Get the current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before
/// succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code: 500,
        }
    }

    /// Create a responder that fails with a custom status code.
    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code,
        }
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

// ---------------------------------------------------------------------------
// DelayedResponder - adds response delay
// ---------------------------------------------------------------------------

/// A wiremock responder that adds a delay before responding; with a delay
/// longer than the engine's request timeout it simulates a hung endpoint.
#[derive(Clone)]
pub struct DelayedResponder {
    delay_ms: u64,
    response_code: u16,
}

impl DelayedResponder {
    /// Create a responder that delays for `ms` milliseconds, then 200.
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            response_code: 200,
        }
    }

    /// Create a delayed responder with a custom status code.
    pub fn with_status(delay_ms: u64, response_code: u16) -> Self {
        Self {
            delay_ms,
            response_code,
        }
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(self.response_code)
            .set_delay(Duration::from_millis(self.delay_ms))
    }
}

// ---------------------------------------------------------------------------
// Signature verification helper
// ---------------------------------------------------------------------------

/// Recompute the body HMAC the way a subscriber would and compare it against
/// the captured `X-Webhook-Signature` header.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signature_header = match request.header("x-webhook-signature") {
        Some(h) => h,
        None => return false,
    };

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(&request.body);
    let expected = hex::encode(mac.finalize().into_bytes());

    signature_header == expected
}
