//! Event fan-out: resolves matching subscriptions for a triggered event and
//! hands one delivery per subscription to the executor.
//!
//! `trigger` is the sole entry point other subsystems call. It is
//! fire-and-forget: the triggering business operation observes no added
//! latency and never sees a dispatch failure.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{DeliveryAttempt, Subscription, WebhookPayload};
use crate::services::delivery_service::DeliveryService;
use crate::store::{DeliveryStore, SubscriptionStore};

/// Fans triggered events out to matching subscriptions.
#[derive(Clone)]
pub struct EventDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    executor: DeliveryService,
    max_attempts: u32,
}

impl EventDispatcher {
    /// Create a dispatcher over the given stores and executor.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        executor: DeliveryService,
        max_attempts: u32,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            executor,
            max_attempts,
        }
    }

    /// Trigger an event for an organization.
    ///
    /// Returns immediately; fan-out and delivery run on spawned tasks. Any
    /// error during fan-out is logged and swallowed. Must be called from
    /// within a tokio runtime.
    pub fn trigger(&self, org_id: Uuid, event_type: &str, data: serde_json::Value) {
        let this = self.clone();
        let event_type = event_type.to_string();
        tokio::spawn(async move {
            this.dispatch(org_id, &event_type, data).await;
        });
    }

    /// Resolve matching subscriptions and create one delivery each.
    ///
    /// All deliveries for one trigger share a payload id: it identifies the
    /// logical event occurrence, not the individual delivery.
    async fn dispatch(&self, org_id: Uuid, event_type: &str, data: serde_json::Value) {
        let subscriptions = match self
            .subscriptions
            .find_active_by_event(org_id, event_type)
            .await
        {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    org_id = %org_id,
                    event_type = %event_type,
                    error = %e,
                    "Failed to query matching subscriptions"
                );
                return;
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                org_id = %org_id,
                event_type = %event_type,
                "No active subscriptions match event type"
            );
            return;
        }

        let payload = WebhookPayload::new(org_id, event_type, data);

        tracing::info!(
            target: "webhook_delivery",
            event_id = %payload.id,
            event_type = %event_type,
            org_id = %org_id,
            subscription_count = subscriptions.len(),
            "Dispatching event to matching subscriptions"
        );

        for subscription in subscriptions {
            self.dispatch_to_subscription(subscription, payload.clone())
                .await;
        }
    }

    /// Create a pending attempt record and spawn its delivery.
    async fn dispatch_to_subscription(&self, subscription: Subscription, payload: WebhookPayload) {
        let attempt = DeliveryAttempt::new(subscription.id, payload, self.max_attempts);

        if let Err(e) = self.deliveries.insert(attempt.clone()).await {
            tracing::error!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                event_id = %attempt.payload.id,
                error = %e,
                "Failed to create delivery record"
            );
            return;
        }

        // Best-effort; a failure here never blocks the delivery.
        if let Err(e) = self
            .subscriptions
            .touch_last_triggered(subscription.id, Utc::now())
            .await
        {
            tracing::debug!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                error = %e,
                "Failed to update last-triggered timestamp"
            );
        }

        // One independent task per subscription: a slow endpoint must not
        // delay deliveries to other subscriptions.
        let executor = self.executor.clone();
        tokio::spawn(async move {
            executor.execute(&subscription, &attempt).await;
        });
    }
}
