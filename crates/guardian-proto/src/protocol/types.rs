//! Protocol type definitions for guardian.
//!
//! Every frame is a single JSON object whose `type` field selects the variant.
//! Field names follow the wire format validators already speak (`publicKey`,
//! `callbackID`, `statusCode`, ...), so the Rust names are mapped explicitly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque correlation id for one dispatched check.
///
/// A fresh random v4 UUID is minted for every (target, validator, round) pair
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Health classification reported for a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickStatus {
    Good,
    Degraded,
    Bad,
}

impl TickStatus {
    /// Whether the target answered in a way that counts towards uptime
    pub fn is_healthy(self) -> bool {
        !matches!(self, TickStatus::Bad)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TickStatus::Good => "Good",
            TickStatus::Degraded => "Degraded",
            TickStatus::Bad => "Bad",
        }
    }
}

impl fmt::Display for TickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TickStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Good" => Ok(TickStatus::Good),
            "Degraded" => Ok(TickStatus::Degraded),
            "Bad" => Ok(TickStatus::Bad),
            other => Err(format!("unknown tick status: {other}")),
        }
    }
}

/// A single target inside a `ping`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub url: String,
}

/// Registration claim sent by a validator right after connecting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Hex-encoded Ed25519 public key (32 bytes)
    pub public_key: String,

    /// The exact string that was signed
    pub message: String,

    /// Hex-encoded Ed25519 signature over `message` (64 bytes)
    pub signature: String,

    /// Free-form location label, e.g. `eu-west`
    pub location: String,

    /// Self-reported address; the hub prefers the socket peer address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Outcome of one target check, sent back by the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateReport {
    /// Identity the validator believes it has; informational only
    #[serde(rename = "validatorID")]
    pub validator_id: String,

    /// The `callbackID` of the originating ping
    #[serde(rename = "ID")]
    pub id: TaskId,

    /// HTTP status code, 0 when no response was received
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    /// Elapsed time in milliseconds. Fractional values on the wire are rounded.
    #[serde(deserialize_with = "whole_millis")]
    pub latency: u64,

    pub status: TickStatus,
}

fn whole_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() || raw < 0.0 {
        return Err(serde::de::Error::custom(format!("latency must be a non-negative number, got {raw}")));
    }
    // Saturates above u64::MAX
    Ok(raw.round() as u64)
}

/// Check request pushed by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    #[serde(rename = "callbackID")]
    pub callback_id: TaskId,

    pub targets: Vec<TargetSpec>,
}

/// Frames a validator sends to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ValidatorMessage {
    Register(RegisterRequest),
    Validate(ValidateReport),
}

/// Frames the hub sends to a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HubMessage {
    Registered {
        #[serde(rename = "validatorID")]
        validator_id: String,
    },
    Ping(PingRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<TaskId>().unwrap(), a);
    }

    #[test]
    fn test_tick_status_health() {
        assert!(TickStatus::Good.is_healthy());
        assert!(TickStatus::Degraded.is_healthy());
        assert!(!TickStatus::Bad.is_healthy());
        assert_eq!("Degraded".parse::<TickStatus>().unwrap(), TickStatus::Degraded);
        assert!("good".parse::<TickStatus>().is_err());
    }

    #[test]
    fn test_ping_wire_shape() {
        let id = TaskId::new();
        let ping = HubMessage::Ping(PingRequest {
            callback_id: id,
            targets: vec![TargetSpec { url: "https://example.com".to_string() }],
        });

        let value = serde_json::to_value(&ping).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["callbackID"], id.to_string());
        assert_eq!(value["targets"][0]["url"], "https://example.com");
    }

    #[test]
    fn test_register_without_ip() {
        let raw = r#"{"type":"register","publicKey":"ab","message":"m","signature":"cd","location":"eu"}"#;
        let msg: ValidatorMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ValidatorMessage::Register(req) => {
                assert_eq!(req.public_key, "ab");
                assert_eq!(req.ip, None);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
