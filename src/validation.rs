//! Input validation for webhook subscriptions.
//!
//! Validates subscription input against:
//! - URL requirements (http/https only, optional private-network guard)
//! - Non-empty event sets
//! - Custom headers that would shadow engine-reserved header names

use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::WebhookError;

/// Header names the engine sets itself. Subscription custom headers may not
/// override these; they are rejected at create/update time and skipped again
/// when the outgoing request is built.
pub const RESERVED_HEADERS: [&str; 5] = [
    "content-type",
    "x-webhook-signature",
    "x-webhook-event",
    "x-webhook-id",
    "user-agent",
];

/// Check whether a header name collides with an engine-reserved header.
pub fn is_reserved_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RESERVED_HEADERS.contains(&lower.as_str())
}

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Validate a webhook delivery URL.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is http or https
/// 3. Host is not a private/internal address when `block_private_networks`
///    is set
pub fn validate_webhook_url(url: &str, block_private_networks: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("URL must have a host".to_string()))?;

    if block_private_networks {
        validate_host_not_internal(host)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Private-network guard
// ---------------------------------------------------------------------------

/// Validate that a host is not a private/internal address.
///
/// Blocks:
/// - Loopback addresses (127.0.0.0/8)
/// - Private networks (10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16)
/// - Link-local (169.254.0.0/16 — AWS/Azure/GCP metadata endpoint)
/// - CGNAT (100.64.0.0/10)
/// - IPv6 loopback and unspecified
/// - Internal hostnames (localhost, *.internal, *.local)
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::SsrfDetected(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(WebhookError::SsrfDetected(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

/// Check if an IP address belongs to a private/internal range.
fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()                // 127.0.0.0/8
                || v4.is_private()          // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || v4.is_link_local()       // 169.254.0.0/16
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // 100.64.0.0/10 (CGNAT)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Event set validation
// ---------------------------------------------------------------------------

/// Validate a subscription's event set: non-empty, no blank tags.
///
/// Event types are opaque strings matched exactly against triggered events,
/// so anything non-blank is accepted.
pub fn validate_event_set(events: &[String]) -> Result<(), WebhookError> {
    if events.is_empty() {
        return Err(WebhookError::Validation(
            "Event set must not be empty".to_string(),
        ));
    }
    for event in events {
        if event.trim().is_empty() {
            return Err(WebhookError::Validation(
                "Event types must not be blank".to_string(),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Custom header validation
// ---------------------------------------------------------------------------

/// Validate a subscription's custom header map.
///
/// Rejects reserved names and header names/values that are not valid HTTP
/// header tokens, so malformed configuration fails at write time instead of
/// on every delivery.
pub fn validate_custom_headers(headers: &HashMap<String, String>) -> Result<(), WebhookError> {
    for (name, value) in headers {
        if is_reserved_header(name) {
            return Err(WebhookError::Validation(format!(
                "Header {name} is reserved and cannot be overridden"
            )));
        }
        if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(WebhookError::Validation(format!(
                "Invalid header name: {name}"
            )));
        }
        if reqwest::header::HeaderValue::from_str(value).is_err() {
            return Err(WebhookError::Validation(format!(
                "Invalid value for header {name}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
