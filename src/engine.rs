//! Engine facade wiring stores, services, and the retry scheduler.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, WebhookError};
use crate::models::{
    CreateSubscription, CreatedSubscription, DeliveryAttempt, SubscriptionInfo, SubscriptionStats,
    UpdateSubscription, WebhookPayload,
};
use crate::scheduler::RetryScheduler;
use crate::services::delivery_service::DeliveryService;
use crate::services::event_dispatcher::EventDispatcher;
use crate::services::stats_service::StatsService;
use crate::services::subscription_service::SubscriptionService;
use crate::store::{DeliveryStore, MemoryStore, SubscriptionStore};

/// The webhook delivery engine.
///
/// Owns the subscription registry, event dispatcher, delivery executor,
/// retry scheduler, and stats view over a shared pair of store handles.
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct WebhookEngine {
    registry: SubscriptionService,
    dispatcher: EventDispatcher,
    executor: DeliveryService,
    stats: StatsService,
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    scheduler: RetryScheduler,
    config: Arc<EngineConfig>,
}

impl WebhookEngine {
    /// Build an engine over caller-provided stores.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the delivery HTTP client cannot
    /// be built, or `WebhookError::EncryptionFailed` for a bad key length.
    pub fn with_stores(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        if config.encryption_key.len() != 32 {
            return Err(WebhookError::EncryptionFailed(format!(
                "Invalid key length: expected 32 bytes, got {}",
                config.encryption_key.len()
            )));
        }

        let config = Arc::new(config);
        let scheduler = RetryScheduler::new();

        let executor = DeliveryService::new(
            Arc::clone(&subscriptions),
            Arc::clone(&deliveries),
            scheduler.clone(),
            Arc::clone(&config),
        )?;

        let registry = SubscriptionService::new(
            Arc::clone(&subscriptions),
            Arc::clone(&deliveries),
            scheduler.clone(),
            Arc::clone(&config),
        );

        let dispatcher = EventDispatcher::new(
            Arc::clone(&subscriptions),
            Arc::clone(&deliveries),
            executor.clone(),
            config.max_attempts,
        );

        let stats = StatsService::new(Arc::clone(&subscriptions), Arc::clone(&deliveries));

        Ok(Self {
            registry,
            dispatcher,
            executor,
            stats,
            subscriptions,
            deliveries,
            scheduler,
            config,
        })
    }

    /// Build an engine backed by the in-memory store.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let subscriptions: Arc<dyn SubscriptionStore> = Arc::clone(&store) as _;
        let deliveries: Arc<dyn DeliveryStore> = store as _;
        Self::with_stores(subscriptions, deliveries, config)
    }

    // -- registry -----------------------------------------------------------

    /// Create a subscription. The returned secret is shown exactly once.
    pub async fn create_subscription(
        &self,
        org_id: Uuid,
        request: CreateSubscription,
    ) -> Result<CreatedSubscription> {
        self.registry.create(org_id, request).await
    }

    /// List an organization's subscriptions (no secrets).
    pub async fn list_subscriptions(
        &self,
        org_id: Uuid,
        active: Option<bool>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SubscriptionInfo>> {
        self.registry.list(org_id, active, limit, offset).await
    }

    /// Get a subscription by id.
    pub async fn get_subscription(&self, id: Uuid) -> Result<SubscriptionInfo> {
        self.registry.get(id).await
    }

    /// Apply a partial update to a subscription.
    pub async fn update_subscription(
        &self,
        id: Uuid,
        request: UpdateSubscription,
    ) -> Result<SubscriptionInfo> {
        self.registry.update(id, request).await
    }

    /// Rotate a subscription's signing secret.
    pub async fn rotate_secret(&self, id: Uuid) -> Result<CreatedSubscription> {
        self.registry.rotate_secret(id).await
    }

    /// Delete a subscription, cascading its delivery history.
    pub async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        self.registry.delete(id).await
    }

    // -- dispatch -----------------------------------------------------------

    /// Trigger an event: fire-and-forget fan-out to matching subscriptions.
    ///
    /// Never fails and never blocks the caller; dispatch errors are logged.
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, org_id: Uuid, event_type: &str, data: serde_json::Value) {
        self.dispatcher.trigger(org_id, event_type, data);
    }

    // -- observability ------------------------------------------------------

    /// Aggregate delivery statistics for one subscription.
    pub async fn stats(&self, subscription_id: Uuid) -> Result<SubscriptionStats> {
        self.stats.stats(subscription_id).await
    }

    /// List a subscription's delivery attempt records, newest first.
    pub async fn list_deliveries(
        &self,
        subscription_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DeliveryAttempt>> {
        self.deliveries
            .list_by_subscription(subscription_id, limit)
            .await
    }

    /// Fetch one delivery attempt record.
    pub async fn get_delivery(&self, id: Uuid) -> Result<DeliveryAttempt> {
        self.deliveries
            .get(id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }

    /// Number of retries currently scheduled (diagnostic).
    pub async fn scheduled_retries(&self) -> usize {
        self.scheduler.scheduled_count().await
    }

    // -- manual test delivery -----------------------------------------------

    /// Send a synthetic test delivery to a subscription, synchronously.
    ///
    /// Uses a real subscribed event type so the subscriber can exercise
    /// signature verification end to end. Exactly one attempt is executed;
    /// no retry is scheduled regardless of outcome. Returns the resulting
    /// attempt record.
    pub async fn send_test(&self, subscription_id: Uuid) -> Result<DeliveryAttempt> {
        let subscription = self
            .subscriptions
            .get(subscription_id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        let event_type = subscription
            .events
            .first()
            .cloned()
            .ok_or_else(|| WebhookError::Validation("Subscription has no events".to_string()))?;

        let payload = WebhookPayload::new(
            subscription.org_id,
            &event_type,
            serde_json::json!({
                "test": true,
                "message": "Manual test delivery",
            }),
        );

        // Ceiling of 1: a failed test goes terminal instead of retrying.
        let attempt = DeliveryAttempt::new(subscription.id, payload, 1);
        self.deliveries.insert(attempt.clone()).await?;

        self.executor.execute(&subscription, &attempt).await;

        self.deliveries
            .get(attempt.id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
