//! Injectable state containers shared by the request pipeline and the
//! notice channel.
//!
//! # Architecture
//!
//! ```text
//! AppState (Arc)
//!     ├── SessionStore   written by login / logout / 401 handling
//!     ├── NoticeStore    written by the notice channel
//!     ├── AlertSlot      written by the notice channel
//!     └── ToastStore     written by try_request and the notice channel
//! ```
//!
//! Each field has a single writer. Readers either take a snapshot or watch
//! the underlying `tokio::sync::watch` channel.

// Rust guideline compliant 2026-02

pub mod notices;
pub mod session;
pub mod surface;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use notices::NoticeStore;
pub use session::{Session, SessionStore, Tenant, User, UserLogin};
pub use surface::{Alert, AlertSlot, Severity, Toast, ToastStore};

/// Shared reference to [`AppState`].
pub type SharedAppState = Arc<AppState>;

/// All process-wide console state, bundled for injection.
#[derive(Debug, Default)]
pub struct AppState {
    /// Operator session.
    pub session: SessionStore,
    /// Pushed notices and channel status mirror.
    pub notices: NoticeStore,
    /// Current notice channel alert.
    pub alert: AlertSlot,
    /// Global toast.
    pub toast: ToastStore,
}

impl AppState {
    /// Create fresh state behind an `Arc`.
    #[must_use]
    pub fn shared() -> SharedAppState {
        Arc::new(Self::default())
    }

    /// Reset the session and every cache derived from it.
    pub fn reset_session(&self) {
        self.session.reset();
        self.notices.clear();
        self.toast.reset();
    }

    /// Expire a session older than its TTL, clearing dependent caches the
    /// same way [`Self::reset_session`] does. Returns `true` if it expired.
    pub fn check_expiration(&self, now: DateTime<Utc>) -> bool {
        let expired = self.session.check_expiration(now);
        if expired {
            self.notices.clear();
            self.toast.reset();
        }
        expired
    }
}
