//! Event-driven webhook delivery engine.
//!
//! Turns domain events into authenticated, retried HTTP callbacks to
//! subscriber-registered endpoints: org-scoped subscription management,
//! fan-out dispatch, HMAC-SHA256 request signing, fixed-table backoff
//! retries, and delivery tracking.
//!
//! Delivery is at-least-once; subscribers must be idempotent on the payload
//! id. Retry timers are in-process and do not survive a restart.
//!
//! ```no_run
//! # async fn example() -> Result<(), webhook_relay::WebhookError> {
//! use webhook_relay::{CreateSubscription, EngineConfig, WebhookEngine};
//! use uuid::Uuid;
//!
//! let engine = WebhookEngine::in_memory(EngineConfig::new(vec![0u8; 32]))?;
//! let org_id = Uuid::new_v4();
//!
//! let created = engine
//!     .create_subscription(
//!         org_id,
//!         CreateSubscription {
//!             name: "ci".into(),
//!             url: "https://hooks.example.com/ci".into(),
//!             events: vec!["report.created".into()],
//!             description: None,
//!             headers: Default::default(),
//!         },
//!     )
//!     .await?;
//! println!("secret (shown once): {}", created.secret);
//!
//! engine.trigger(org_id, "report.created", serde_json::json!({"reportId": "r-1"}));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod validation;

pub use config::EngineConfig;
pub use engine::WebhookEngine;
pub use error::WebhookError;
pub use models::{
    CreateSubscription, CreatedSubscription, DeliveryAttempt, DeliveryStatus, SubscriptionInfo,
    SubscriptionStats, UpdateSubscription, WebhookPayload,
};
pub use store::{DeliveryStore, MemoryStore, SubscriptionStore};
