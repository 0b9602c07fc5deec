use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{FlowtrackError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Authenticates inbound webhooks against a shared secret.
///
/// Fails closed: construction rejects an empty secret, and verification must
/// pass before any payload-driven state mutation. Neither the secret nor any
/// computed signature is ever logged.
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(FlowtrackError::MissingSecret);
        }
        Ok(Self {
            secret: secret.into_bytes(),
        })
    }

    /// Check `signature_hex` against the hex-encoded HMAC-SHA256 of the raw
    /// payload bytes. Errors with [`FlowtrackError::Verification`] on
    /// mismatch.
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> Result<()> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| FlowtrackError::MissingSecret)?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !secure_compare(expected.as_bytes(), signature_hex.as_bytes()) {
            return Err(FlowtrackError::Verification);
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// Timing-safe comparison: length check first, then an XOR accumulated over
/// every byte so the loop never exits early on the first mismatch.
fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
