//! Business logic services for the webhook engine.

pub mod delivery_service;
pub mod event_dispatcher;
pub mod stats_service;
pub mod subscription_service;
