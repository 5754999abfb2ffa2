//! Cryptographic operations for webhook secrets and payload signing.
//!
//! - Random secret generation for new subscriptions
//! - AES-256-GCM encryption/decryption for subscription secrets at rest
//! - HMAC-SHA256 computation for webhook payload signatures

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Length of a generated subscription secret in bytes (256 bits).
const SECRET_BYTES: usize = 32;

/// Length of the hex prefix kept for operator identification.
pub const SECRET_PREFIX_LEN: usize = 8;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Secret generation
// ---------------------------------------------------------------------------

/// Generate a fresh subscription secret: 256 random bits, hex-encoded.
pub fn generate_secret() -> String {
    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The masked prefix of a secret shown in listings (`"a1b2c3d4…"`).
pub fn secret_prefix(secret: &str) -> String {
    let prefix: String = secret.chars().take(SECRET_PREFIX_LEN).collect();
    format!("{prefix}\u{2026}")
}

// ---------------------------------------------------------------------------
// AES-256-GCM encryption/decryption (for secrets at rest)
// ---------------------------------------------------------------------------

/// Encrypt a plaintext secret to a base64-encoded string for storage.
///
/// Format: base64(nonce || ciphertext || auth_tag)
pub fn encrypt_secret(plaintext: &str, key: &[u8]) -> Result<String, WebhookError> {
    if key.len() != 32 {
        return Err(WebhookError::EncryptionFailed(format!(
            "Invalid key length: expected 32 bytes, got {}",
            key.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&result))
}

/// Decrypt a base64-encoded secret from storage back to plaintext.
pub fn decrypt_secret(encoded: &str, key: &[u8]) -> Result<String, WebhookError> {
    if key.len() != 32 {
        return Err(WebhookError::EncryptionFailed(format!(
            "Invalid key length: expected 32 bytes, got {}",
            key.len()
        )));
    }

    let encrypted = BASE64
        .decode(encoded)
        .map_err(|e| WebhookError::EncryptionFailed(format!("Base64 decode failed: {e}")))?;

    if encrypted.len() < NONCE_SIZE + 1 {
        return Err(WebhookError::EncryptionFailed(
            "Invalid encrypted data format".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
    let ciphertext = &encrypted[NONCE_SIZE..];

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| WebhookError::EncryptionFailed(e.to_string()))
}

// ---------------------------------------------------------------------------
// HMAC-SHA256 payload signing
// ---------------------------------------------------------------------------

/// Compute the HMAC-SHA256 signature for a webhook request body.
///
/// The signature covers exactly the raw bytes sent on the wire, so a
/// subscriber recomputing the HMAC over the received body reproduces the
/// `X-Webhook-Signature` header. Returns a hex-encoded string.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify an HMAC-SHA256 signature using constant-time comparison.
pub fn verify_signature(expected_hex: &str, secret: &str, body: &[u8]) -> bool {
    let computed = compute_signature(secret, body);
    constant_time_eq(expected_hex.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
