//! Protocol module for guardian.
//!
//! Message types exchanged between hub and validators, and the frame codec.

pub mod codec;
pub mod types;

pub use codec::{decode_binary_frame, decode_frame, encode_frame, Envelope, FrameError};
pub use types::{
    HubMessage, PingRequest, RegisterRequest, TargetSpec, TaskId, TickStatus, ValidateReport,
    ValidatorMessage,
};
