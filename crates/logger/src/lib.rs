//! Shared tracing setup for the guardian binaries.

mod subscriber;

pub use subscriber::{LogFormat, init_tracing, init_tracing_with};
