//! HMAC-SHA256 signature generation and verification.
//!
//! Signatures are lowercase hex encodings of `HMAC-SHA256(secret, body)`.
//! Verification never fails loudly: empty, malformed or wrongly sized
//! signatures all resolve to `false`, and digests are compared in constant
//! time.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks webhook signatures for a configured signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier").field("secret", &"***").finish()
    }
}

impl SignatureVerifier {
    /// Creates a verifier keyed by the given signing secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Generates the lowercase hex signature of `payload`.
    ///
    /// # Example
    ///
    /// ```
    /// use hookgate_api::crypto::SignatureVerifier;
    ///
    /// let verifier = SignatureVerifier::new("my_secret_key");
    /// let signature = verifier.generate(b"webhook payload");
    ///
    /// assert_eq!(signature.len(), 64);
    /// assert!(verifier.verify(b"webhook payload", &signature));
    /// ```
    pub fn generate(&self, payload: &[u8]) -> String {
        hex::encode(compute_hmac(payload, self.secret.as_bytes()))
    }

    /// Checks `signature` against the configured secret.
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        self.verify_with_secret(payload, signature, &self.secret)
    }

    /// Checks `signature` against an explicit secret instead of the
    /// configured one.
    pub fn verify_with_secret(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        if signature.is_empty() {
            return false;
        }

        let Ok(provided) = hex::decode(signature) else {
            return false;
        };

        let expected = compute_hmac(payload, secret.as_bytes());
        timing_safe_eq(&provided, &expected)
    }
}

/// Computes the raw HMAC-SHA256 digest.
fn compute_hmac(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, including empty ones.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Timing-safe byte comparison.
///
/// The running time depends only on the input lengths, never on the position
/// of the first differing byte.
pub(crate) fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}
