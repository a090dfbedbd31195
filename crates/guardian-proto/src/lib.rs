//! guardian-proto - shared vocabulary between the uptime hub and its validators
//!
//! The hub and every validator agent speak the same framed JSON protocol over a
//! long-lived WebSocket. This crate owns the message shapes, the tolerant frame
//! decoder, and the Ed25519 identity used to admit validators.

pub mod crypto;
pub mod protocol;

// Re-export main types
pub use crypto::{KeyPair, PublicKey, RegistrationClaim};
pub use protocol::{
    decode_frame, encode_frame, FrameError, HubMessage, PingRequest, RegisterRequest, TargetSpec,
    TaskId, TickStatus, ValidateReport, ValidatorMessage,
};

/// Default port the hub gateway listens on
pub const DEFAULT_HUB_PORT: u16 = 5050;
