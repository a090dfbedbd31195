//! Cryptographic identity for guardian validators.
//!
//! - Ed25519 key generation and on-disk persistence
//! - Registration claim construction and signing
//! - Fail-closed signature verification

pub mod keys;
pub mod signing;
pub mod verification;

pub use keys::{generate_keypair, load_keypair, load_or_generate_keypair, save_keypair, KeyError, KeyPair, PublicKey};
pub use signing::{sign_bytes, sign_registration, RegistrationClaim};
pub use verification::{verify_hex, verify_signature};
