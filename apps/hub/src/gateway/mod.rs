//! Validator-facing side of the hub: one long-lived WebSocket per validator.

mod handler;
mod listener;
mod session;

pub use handler::{FrameOutcome, IgnoreReason, MessageRouter};
pub use listener::Gateway;
pub use session::{Session, SessionIdentity};
