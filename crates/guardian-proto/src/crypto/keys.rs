//! Ed25519 key generation and management.
//!
//! A validator's identity is its Ed25519 public key. The key is stable across
//! reconnects, so the secret half is persisted to a 32-byte file and reused.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use ed25519_dalek::{SECRET_KEY_LENGTH, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SECRET_KEY_LEN: usize = SECRET_KEY_LENGTH;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("public key is not valid hex")]
    NotHex,
    #[error("public key must be 32 bytes, got {0}")]
    WrongLength(usize),
    #[error("public key is not a valid Ed25519 point")]
    InvalidPoint,
}

/// Ed25519 public key, rendered as lowercase hex on the wire and in logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode into a verifying key; rejects bytes that are not a curve point.
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| KeyError::InvalidPoint)
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::NotHex)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::WrongLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for PublicKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full keys make log lines unreadable
        let hex = self.to_hex();
        write!(f, "PublicKey({}..)", &hex[..12])
    }
}

/// KeyPair for Ed25519 signing
#[derive(Clone)]
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Create a new keypair from a signing key
    pub fn new(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    /// Get the public key as bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public_key_bytes())
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }
}

/// Fresh identity from the OS random source
pub fn generate_keypair() -> KeyPair {
    let mut seed = [0u8; SECRET_KEY_LEN];
    OsRng.fill_bytes(&mut seed);
    KeyPair::new(SigningKey::from_bytes(&seed))
}

/// Persist only the 32-byte secret; the public half is derived on load.
pub fn save_keypair(keypair: &KeyPair, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }

    let mut file = secret_file(path).with_context(|| format!("Cannot create secret key file {}", path.display()))?;
    file.write_all(&keypair.signing_key.to_bytes())
        .with_context(|| format!("Cannot write secret key to {}", path.display()))?;

    tracing::info!(key = %keypair.public_key(), "Stored validator identity at {}", path.display());
    Ok(())
}

/// Open for writing, owner-only from creation on unix
#[cfg(unix)]
fn secret_file(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)?;
    // mode() only applies to new files
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn secret_file(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

pub fn load_keypair(path: &Path) -> Result<KeyPair> {
    let raw = fs::read(path).with_context(|| format!("Cannot read secret key from {}", path.display()))?;

    let Ok(seed) = <[u8; SECRET_KEY_LEN]>::try_from(raw.as_slice()) else {
        anyhow::bail!("{} holds {} bytes, expected a {SECRET_KEY_LEN}-byte secret key", path.display(), raw.len());
    };

    Ok(KeyPair::new(SigningKey::from_bytes(&seed)))
}

/// Reuse the identity stored at `path`, creating it on first start.
pub fn load_or_generate_keypair(path: &Path) -> Result<KeyPair> {
    if !path.exists() {
        let keypair = generate_keypair();
        save_keypair(&keypair, path)?;
        return Ok(keypair);
    }

    let keypair = load_keypair(path)?;
    tracing::debug!(key = %keypair.public_key(), "Loaded validator identity from {}", path.display());
    Ok(keypair)
}
