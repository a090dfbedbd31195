//! Ed25519 signing and the registration claim.
//!
//! A validator proves ownership of its public key by signing a short string
//! that binds the key to the current time:
//!
//! ```text
//! Register validator <public-key-hex> at <unix-millis>
//! ```
//!
//! The hub rebuilds nothing; it parses the signed string back and checks that
//! the embedded key matches the claimed one and that the timestamp is fresh.

use std::time::{SystemTime, UNIX_EPOCH};

use ed25519_dalek::Signer;

use super::keys::{KeyPair, PublicKey};
use crate::protocol::RegisterRequest;

const CLAIM_PREFIX: &str = "Register validator ";
const CLAIM_SEPARATOR: &str = " at ";

/// Sign raw bytes with a keypair. Returns 64-byte Ed25519 signature.
pub fn sign_bytes(data: &[u8], keypair: &KeyPair) -> Vec<u8> {
    let signature = keypair.signing_key.sign(data);
    signature.to_bytes().to_vec()
}

/// Identity and time bound into a registration message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationClaim {
    pub public_key: PublicKey,
    pub timestamp_ms: u64,
}

impl RegistrationClaim {
    /// Claim for `public_key` stamped with the current wall clock
    pub fn now(public_key: PublicKey) -> Self {
        Self { public_key, timestamp_ms: unix_millis(SystemTime::now()) }
    }

    /// Render the exact string that gets signed
    pub fn message(&self) -> String {
        format!("{CLAIM_PREFIX}{}{CLAIM_SEPARATOR}{}", self.public_key, self.timestamp_ms)
    }

    /// Parse a signed string back into a claim. Returns `None` on any deviation
    /// from the canonical form.
    pub fn parse(message: &str) -> Option<Self> {
        let rest = message.strip_prefix(CLAIM_PREFIX)?;
        let (key_hex, timestamp) = rest.split_once(CLAIM_SEPARATOR)?;

        // Reject leading '+' and similar forms u64::from_str would accept
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(Self { public_key: key_hex.parse().ok()?, timestamp_ms: timestamp.parse().ok()? })
    }

    /// Absolute distance between the claim time and `now`
    pub fn skew_from(&self, now: SystemTime) -> std::time::Duration {
        let now_ms = unix_millis(now);
        std::time::Duration::from_millis(now_ms.abs_diff(self.timestamp_ms))
    }
}

/// Build a signed `register` request for this keypair.
pub fn sign_registration(keypair: &KeyPair, location: &str, ip: Option<String>) -> RegisterRequest {
    let claim = RegistrationClaim::now(keypair.public_key());
    let message = claim.message();
    let signature = sign_bytes(message.as_bytes(), keypair);

    RegisterRequest {
        public_key: keypair.public_key_hex(),
        message,
        signature: hex::encode(signature),
        location: location.to_string(),
        ip,
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_keypair;
    use crate::crypto::verification::verify_hex;

    #[test]
    fn test_sign_bytes_produces_64_byte_signature() {
        let keypair = generate_keypair();
        let sig = sign_bytes(b"hello world", &keypair);
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn test_claim_message_parses_back() {
        let key = generate_keypair().public_key();
        let claim = RegistrationClaim { public_key: key, timestamp_ms: 1_700_000_000_123 };

        let message = claim.message();
        assert!(message.starts_with("Register validator "));
        assert_eq!(RegistrationClaim::parse(&message), Some(claim));
    }

    #[test]
    fn test_claim_parse_rejects_variants() {
        let key = generate_keypair().public_key();
        assert_eq!(RegistrationClaim::parse("hello"), None);
        assert_eq!(RegistrationClaim::parse(&format!("Register validator {key} at ")), None);
        assert_eq!(RegistrationClaim::parse(&format!("Register validator {key} at +5")), None);
        assert_eq!(RegistrationClaim::parse("Register validator abc at 5"), None);
    }

    #[test]
    fn test_skew() {
        let key = generate_keypair().public_key();
        let now = SystemTime::now();
        let claim = RegistrationClaim { public_key: key, timestamp_ms: unix_millis(now) - 5_000 };

        assert_eq!(claim.skew_from(now).as_millis(), 5_000);
    }

    #[test]
    fn test_sign_registration_verifies() {
        let keypair = generate_keypair();
        let request = sign_registration(&keypair, "eu-west", Some("10.0.0.5".into()));

        assert_eq!(request.public_key, keypair.public_key_hex());
        assert_eq!(request.location, "eu-west");
        assert!(verify_hex(&request.message, &request.signature, &request.public_key));
    }
}
