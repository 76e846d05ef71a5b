//! # relay-session
//!
//! Stream session coordinator for Relay.
//!
//! Manages zero or more concurrently active response streams, each bound to
//! a conversational task, independent of which task is currently displayed.
//! A stream started for a brand-new task runs under a provisional key until
//! the backend assigns the durable task id, then is atomically rekeyed — no
//! lost fragments, no duplicates, no cross-session confusion.
//!
//! ## Features
//! - Per-session state machine (Idle → Streaming → Stopping → terminal)
//! - Exactly-once, race-free identity resolution
//! - Cooperative, bounded cancellation (first terminal event wins)
//! - Broadcast notices + per-start callbacks for presentation layers

pub mod error;
pub mod key;
pub mod registry;
pub mod session;
pub mod state;

mod identity;

// Core types
pub use key::SessionKey;
pub use session::{SessionSnapshot, StreamSession};
pub use state::SessionState;

// Registry surface
pub use registry::{SessionNotice, SessionRegistry, StartCallbacks};

// Error
pub use error::StreamError;
