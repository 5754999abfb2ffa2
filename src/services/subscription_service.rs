//! Webhook subscription registry.
//!
//! Create, list, update, and delete subscription records with URL and
//! event-set validation, at-rest secret encryption, and cascade deletion of
//! delivery history. The raw secret appears exactly once in the result of
//! `create` or `rotate_secret` and is never readable afterwards.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::crypto;
use crate::error::{Result, WebhookError};
use crate::models::{
    CreateSubscription, CreatedSubscription, Subscription, SubscriptionInfo, UpdateSubscription,
};
use crate::scheduler::RetryScheduler;
use crate::store::{DeliveryStore, SubscriptionStore};
use crate::validation;

/// Service for subscription management operations.
#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    scheduler: RetryScheduler,
    config: Arc<EngineConfig>,
}

impl SubscriptionService {
    /// Create a new subscription service.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        scheduler: RetryScheduler,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            scheduler,
            config,
        }
    }

    /// Create a new webhook subscription.
    ///
    /// Returns the full record including the freshly generated secret. This
    /// is the only time the secret is exposed; store it now or rotate later.
    pub async fn create(
        &self,
        org_id: Uuid,
        request: CreateSubscription,
    ) -> Result<CreatedSubscription> {
        validation::validate_webhook_url(&request.url, self.config.block_private_networks)?;
        validation::validate_event_set(&request.events)?;
        validation::validate_custom_headers(&request.headers)?;

        let secret = crypto::generate_secret();
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.config.encryption_key)?;

        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            org_id,
            name: request.name,
            description: request.description,
            url: request.url,
            secret_encrypted,
            secret_prefix: crypto::secret_prefix(&secret),
            events: request.events,
            active: true,
            headers: request.headers,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };

        self.subscriptions.insert(subscription.clone()).await?;

        tracing::info!(
            target: "webhook_registry",
            subscription_id = %subscription.id,
            org_id = %org_id,
            url = %subscription.url,
            "Webhook subscription created"
        );

        Ok(CreatedSubscription {
            subscription: subscription.into(),
            secret,
        })
    }

    /// List an organization's subscriptions, newest first.
    ///
    /// Secrets are never included; only the masked prefix.
    pub async fn list(
        &self,
        org_id: Uuid,
        active: Option<bool>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SubscriptionInfo>> {
        let limit = limit.clamp(1, 100);
        let subs = self.subscriptions.list(org_id, active, limit, offset).await?;
        Ok(subs.into_iter().map(SubscriptionInfo::from).collect())
    }

    /// Get a single subscription.
    pub async fn get(&self, id: Uuid) -> Result<SubscriptionInfo> {
        let sub = self
            .subscriptions
            .get(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;
        Ok(sub.into())
    }

    /// Apply a partial update to a subscription.
    ///
    /// Fields present in the request are re-validated; absent fields are
    /// left unchanged. The secret cannot be set this way — use
    /// [`rotate_secret`](Self::rotate_secret).
    pub async fn update(&self, id: Uuid, request: UpdateSubscription) -> Result<SubscriptionInfo> {
        let mut sub = self
            .subscriptions
            .get(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        if let Some(ref url) = request.url {
            validation::validate_webhook_url(url, self.config.block_private_networks)?;
        }
        if let Some(ref events) = request.events {
            validation::validate_event_set(events)?;
        }
        if let Some(ref headers) = request.headers {
            validation::validate_custom_headers(headers)?;
        }

        if let Some(name) = request.name {
            sub.name = name;
        }
        if let Some(description) = request.description {
            sub.description = Some(description);
        }
        if let Some(url) = request.url {
            sub.url = url;
        }
        if let Some(events) = request.events {
            sub.events = events;
        }
        if let Some(active) = request.active {
            sub.active = active;
        }
        if let Some(headers) = request.headers {
            sub.headers = headers;
        }
        sub.updated_at = Utc::now();

        self.subscriptions.update(sub.clone()).await?;
        Ok(sub.into())
    }

    /// Replace a subscription's secret with a fresh one, invalidating the
    /// old secret immediately. Returns the new raw secret exactly once.
    pub async fn rotate_secret(&self, id: Uuid) -> Result<CreatedSubscription> {
        let mut sub = self
            .subscriptions
            .get(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        let secret = crypto::generate_secret();
        sub.secret_encrypted = crypto::encrypt_secret(&secret, &self.config.encryption_key)?;
        sub.secret_prefix = crypto::secret_prefix(&secret);
        sub.updated_at = Utc::now();

        self.subscriptions.update(sub.clone()).await?;

        tracing::info!(
            target: "webhook_registry",
            subscription_id = %id,
            "Webhook subscription secret rotated"
        );

        Ok(CreatedSubscription {
            subscription: sub.into(),
            secret,
        })
    }

    /// Delete a subscription, its delivery history, and any scheduled
    /// retries.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.subscriptions.delete(id).await? {
            return Err(WebhookError::SubscriptionNotFound);
        }

        // Cancel timers first so a firing retry cannot race the cascade;
        // anything already executing fails closed on the missing record.
        self.scheduler.cancel_for_subscription(id).await;
        let removed = self.deliveries.delete_by_subscription(id).await?;

        tracing::info!(
            target: "webhook_registry",
            subscription_id = %id,
            deliveries_removed = removed,
            "Webhook subscription deleted"
        );

        Ok(())
    }
}
