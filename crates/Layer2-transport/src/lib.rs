//! # relay-transport
//!
//! Chunked stream transport layer for Relay.
//! One connection per session attempt, translated into an ordered stream
//! of abstract events.
//!
//! ## Features
//! - SSE-style chunked event streaming
//! - Cooperative, bounded cancellation (best-effort backend notify)
//! - No automatic reconnection: a dropped stream ends with an error and the
//!   caller decides whether to start fresh

pub mod error;
pub mod http;
pub mod r#trait;
pub mod wire;

// Core trait and types
pub use r#trait::{EventStream, StreamEvent, StreamTransport};

// Error
pub use error::TransportError;

// Wire model
pub use wire::{parse_sse_line, WireEvent};

// Transport implementations
pub use http::HttpStreamTransport;
