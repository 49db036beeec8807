//! Session-gated realtime notice channel.
//!
//! One persistent WebSocket carries server-pushed notices to the console.
//! Its lifecycle follows the session: it opens when the operator becomes
//! admin-authenticated and is force-closed the moment that stops being true.
//!
//! # Architecture
//!
//! ```text
//! SessionStore (watch) ──┐
//! NoticeChannelHandle ───┼──> NoticeChannel task
//! Transport events ──────┘        │
//!                                 ├── ChannelMachine::step(event) -> effects   (pure)
//!                                 └── effect runner
//!                                       ├── spawn / abort Transport::run
//!                                       ├── retry timer
//!                                       └── NoticeStore / AlertSlot / ToastStore
//! ```
//!
//! # Close codes
//!
//! - `1008` policy violation: sticky alert with the server's reason, no retry
//! - `3000` unauthorized for the channel: sticky alert while admin, no retry
//! - anything else: transient, retried every [`RECONNECT_DELAY`]
//!
//! [`RECONNECT_DELAY`]: crate::constants::RECONNECT_DELAY

// Rust guideline compliant 2026-02

pub mod machine;
pub mod runner;
pub mod transport;

use serde::{Deserialize, Serialize};

/// Connection state of the notice channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelStatus {
    /// No connection and no attempt in flight.
    #[default]
    Closed,
    /// Handshake in progress.
    Connecting,
    /// Connected and receiving.
    Open,
}

impl ChannelStatus {
    /// Indicator color used by the console header.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Open => "green",
            Self::Connecting => "primary",
            Self::Closed => "grey",
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
        }
    }
}

// Re-exports
pub use machine::{ChannelEvent, ChannelMachine, Effect, RetryPolicy};
pub use runner::{NoticeChannel, NoticeChannelHandle};
pub use transport::{Closure, Transport, TransportEvent, TransportEvents, WsTransport};
