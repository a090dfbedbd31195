//! Admission check for `register` frames.

use guardian_proto::crypto::{KeyError, verify_signature};
use guardian_proto::{PublicKey, RegisterRequest, RegistrationClaim};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid public key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("signature does not verify")]
    BadSignature,
    #[error("registration message is not a recognised claim")]
    MalformedClaim,
    #[error("signed message names a different key")]
    KeyMismatch,
    #[error("registration timestamp is {skew_ms}ms away from hub time")]
    Stale { skew_ms: u128 },
}

/// Verifies a signed registration claim against the hub clock.
#[derive(Debug, Clone)]
pub struct RegistrationVerifier {
    max_skew: Duration,
}

impl RegistrationVerifier {
    pub fn new(max_skew: Duration) -> Self {
        Self { max_skew }
    }

    pub fn verify(&self, request: &RegisterRequest) -> Result<PublicKey, AuthError> {
        self.verify_at(request, SystemTime::now())
    }

    /// Checks run cheapest-first and stop at the first failure. The signature
    /// is checked before the message is interpreted at all.
    pub fn verify_at(&self, request: &RegisterRequest, now: SystemTime) -> Result<PublicKey, AuthError> {
        let public_key: PublicKey = request.public_key.parse()?;
        public_key.verifying_key()?;

        let signature = hex::decode(request.signature.trim()).map_err(|_| AuthError::BadSignature)?;
        if !verify_signature(request.message.as_bytes(), &signature, public_key.as_bytes()) {
            return Err(AuthError::BadSignature);
        }

        let claim = RegistrationClaim::parse(&request.message).ok_or(AuthError::MalformedClaim)?;
        if claim.public_key != public_key {
            return Err(AuthError::KeyMismatch);
        }

        let skew = claim.skew_from(now);
        if skew > self.max_skew {
            return Err(AuthError::Stale { skew_ms: skew.as_millis() });
        }

        Ok(public_key)
    }
}
