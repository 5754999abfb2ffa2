//! Delivery statistics aggregated from the delivery store.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Result, WebhookError};
use crate::models::{DeliveryStatus, SubscriptionStats};
use crate::store::{DeliveryStore, SubscriptionStore};

/// Read-only view over a subscription's delivery history.
///
/// Eventually consistent with in-flight deliveries; a record counted as
/// `retrying` here may already have resolved by the time the caller looks.
#[derive(Clone)]
pub struct StatsService {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
}

impl StatsService {
    /// Create a new stats service.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
        }
    }

    /// Aggregate delivery counts and success rate for one subscription.
    pub async fn stats(&self, subscription_id: Uuid) -> Result<SubscriptionStats> {
        if self.subscriptions.get(subscription_id).await?.is_none() {
            return Err(WebhookError::SubscriptionNotFound);
        }

        let attempts = self
            .deliveries
            .list_by_subscription(subscription_id, usize::MAX)
            .await?;

        let mut stats = SubscriptionStats {
            total_deliveries: 0,
            successful: 0,
            failed: 0,
            retrying: 0,
            pending: 0,
            success_rate: 0.0,
            last_delivery_at: None,
        };

        for attempt in &attempts {
            stats.total_deliveries += 1;
            match attempt.status {
                DeliveryStatus::Success => stats.successful += 1,
                DeliveryStatus::Failed => stats.failed += 1,
                DeliveryStatus::Retrying => stats.retrying += 1,
                DeliveryStatus::Pending => stats.pending += 1,
            }
            if let Some(delivered_at) = attempt.delivered_at {
                stats.last_delivery_at = Some(match stats.last_delivery_at {
                    Some(current) if current > delivered_at => current,
                    _ => delivered_at,
                });
            }
        }

        let terminal = stats.successful + stats.failed;
        if terminal > 0 {
            stats.success_rate = stats.successful as f64 / terminal as f64;
        }

        Ok(stats)
    }
}
