//! Frame codec for guardian.
//!
//! Decoding is two-staged so callers can tell a garbage frame apart from a
//! well-formed frame of a type they do not speak. Both are dropped by the
//! gateway, but they are logged differently.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::types::{HubMessage, ValidatorMessage};

/// A message family that travels in one direction of the connection.
pub trait Envelope: DeserializeOwned + Serialize {
    /// Values of the `type` discriminator this family understands
    const KINDS: &'static [&'static str];
}

impl Envelope for ValidatorMessage {
    const KINDS: &'static [&'static str] = &["register", "validate"];
}

impl Envelope for HubMessage {
    const KINDS: &'static [&'static str] = &["registered", "ping"];
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame is not valid UTF-8")]
    NotUtf8,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("invalid `{kind}` payload: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one text frame into a message of family `T`.
pub fn decode_frame<T: Envelope>(text: &str) -> Result<T, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();

    if !T::KINDS.contains(&kind.as_str()) {
        return Err(FrameError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| FrameError::Invalid { kind, source })
}

/// Decode a binary frame that carries UTF-8 JSON.
pub fn decode_binary_frame<T: Envelope>(bytes: &[u8]) -> Result<T, FrameError> {
    let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8)?;
    decode_frame(text)
}

/// Encode a message as a single text frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{PingRequest, TargetSpec, TaskId};

    #[test]
    fn test_garbage_is_malformed() {
        let err = decode_frame::<ValidatorMessage>("{not json").unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_missing_type() {
        let err = decode_frame::<ValidatorMessage>(r#"{"ID":"x"}"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingType));

        let err = decode_frame::<ValidatorMessage>(r#"[1,2,3]"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingType));
    }

    #[test]
    fn test_unknown_type_is_reported_by_name() {
        let err = decode_frame::<ValidatorMessage>(r#"{"type":"heartbeat"}"#).unwrap_err();
        match err {
            FrameError::UnknownType(kind) => assert_eq!(kind, "heartbeat"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_direction_is_enforced() {
        // A hub-only message arriving at the hub is unknown there.
        let ping = HubMessage::Ping(PingRequest {
            callback_id: TaskId::new(),
            targets: vec![TargetSpec { url: "https://example.com".into() }],
        });
        let text = encode_frame(&ping).unwrap();

        assert!(matches!(
            decode_frame::<ValidatorMessage>(&text),
            Err(FrameError::UnknownType(_))
        ));
        assert_eq!(decode_frame::<HubMessage>(&text).unwrap(), ping);
    }

    #[test]
    fn test_invalid_payload_keeps_kind() {
        let err = decode_frame::<ValidatorMessage>(
            r#"{"type":"validate","validatorID":"v","ID":"not-a-uuid","statusCode":200,"latency":5,"status":"Good"}"#,
        )
        .unwrap_err();

        match err {
            FrameError::Invalid { kind, .. } => assert_eq!(kind, "validate"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_binary_frame() {
        let err = decode_binary_frame::<ValidatorMessage>(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, FrameError::NotUtf8));

        let msg = decode_binary_frame::<HubMessage>(br#"{"type":"registered","validatorID":"abc"}"#)
            .unwrap();
        assert_eq!(msg, HubMessage::Registered { validator_id: "abc".into() });
    }
}
