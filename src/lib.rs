//! Mesh Console - operator console core for a mesh VPN control plane.
//!
//! This crate provides the two subsystems the console is built on: the
//! authenticated request pipeline and the session-gated realtime notice
//! channel. Views are external and consume both through the shared state
//! containers.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! - **Casing** - key-casing translation over JSON trees
//! - **State** - injectable session, notice, alert and toast stores
//! - **Api** - request pipeline: casing, failure taxonomy, session invalidation
//! - **Channel** - notice WebSocket driven by a pure state machine
//!
//! # Modules
//!
//! - [`casing`] - camelize / decamelize JSON keys
//! - [`state`] - `AppState` and its stores
//! - [`api`] - `ApiClient`, `try_request`, logout, metrics
//! - [`channel`] - `NoticeChannel` and its transport
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod api;
pub mod casing;
pub mod channel;
pub mod state;

pub mod config;
pub mod constants;
pub mod env;

// Re-export commonly used types
pub use api::{try_request, try_request_value, ApiClient, ApiError};
pub use channel::{ChannelStatus, NoticeChannel, NoticeChannelHandle, WsTransport};
pub use config::Config;
pub use state::{AppState, SharedAppState};
