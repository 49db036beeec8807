//! Operator-facing alert and toast records.
//!
//! Sticky alerts stay visible until dismissed or replaced; toasts are
//! one-shot and auto-dismissing. Both subsystems surface failures through
//! these two shapes only.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::constants::{REQUEST_ERROR_TITLE, TOAST_COLOR_ERROR};

/// Alert severity, mirroring the banner styles of the console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Operation succeeded.
    Success,
    /// Neutral information.
    Info,
    /// Degraded but usable.
    Warning,
    /// Failure.
    #[default]
    Error,
}

/// A sticky banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Whether the banner is shown.
    pub visible: bool,
    /// Optional heading.
    pub title: Option<String>,
    /// Body text.
    pub message: String,
    /// Banner style.
    pub severity: Severity,
}

impl Alert {
    /// Visible, untitled error banner.
    #[must_use]
    pub fn sticky(message: impl Into<String>) -> Self {
        Self {
            visible: true,
            title: None,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// Visible `Error!` banner used for generic request failures.
    #[must_use]
    pub fn request_error(message: impl Into<String>) -> Self {
        Self {
            title: Some(REQUEST_ERROR_TITLE.to_string()),
            ..Self::sticky(message)
        }
    }
}

/// A one-shot notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    /// Body text.
    pub message: String,
    /// Display color (`red` for failures).
    pub color: String,
    /// Whether the toast is shown.
    pub visible: bool,
}

impl Toast {
    /// Visible red toast.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            color: TOAST_COLOR_ERROR.to_string(),
            visible: true,
        }
    }
}

/// Slot holding the current channel alert, if any.
#[derive(Debug)]
pub struct AlertSlot {
    tx: watch::Sender<Option<Alert>>,
}

impl Default for AlertSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Show `alert`, or clear the slot with `None`.
    ///
    /// Watchers are only woken when the value actually changes.
    pub fn set(&self, alert: Option<Alert>) {
        self.tx.send_if_modified(|current| {
            if *current == alert {
                return false;
            }
            *current = alert;
            true
        });
    }

    /// Current alert.
    #[must_use]
    pub fn get(&self) -> Option<Alert> {
        self.tx.borrow().clone()
    }

    /// Watch the slot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Alert>> {
        self.tx.subscribe()
    }
}

/// Global toast sink.
#[derive(Debug)]
pub struct ToastStore {
    tx: watch::Sender<Toast>,
}

impl Default for ToastStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ToastStore {
    /// Create a store holding a hidden toast.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Toast::default());
        Self { tx }
    }

    /// Show a toast. Always notifies watchers, even for a repeated message.
    pub fn set(&self, toast: Toast) {
        log::debug!("[Toast] {}", toast.message);
        self.tx.send_replace(toast);
    }

    /// Current toast.
    #[must_use]
    pub fn get(&self) -> Toast {
        self.tx.borrow().clone()
    }

    /// Hide the toast.
    pub fn reset(&self) {
        self.tx.send_replace(Toast::default());
    }

    /// Watch the toast.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Toast> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_alert_shape() {
        let alert = Alert::request_error("boom");
        assert!(alert.visible);
        assert_eq!(alert.title.as_deref(), Some("Error!"));
        assert_eq!(alert.severity, Severity::Error);
    }

    #[test]
    fn test_alert_slot_only_notifies_on_change() {
        let slot = AlertSlot::new();
        let mut rx = slot.subscribe();

        slot.set(None);
        assert!(!rx.has_changed().expect("sender alive"));

        slot.set(Some(Alert::sticky("closed")));
        assert!(rx.has_changed().expect("sender alive"));
        rx.borrow_and_update();

        slot.set(Some(Alert::sticky("closed")));
        assert!(!rx.has_changed().expect("sender alive"));

        slot.set(None);
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_toast_store_set_and_reset() {
        let store = ToastStore::new();
        assert!(!store.get().visible);

        store.set(Toast::error("logged out"));
        let toast = store.get();
        assert!(toast.visible);
        assert_eq!(toast.color, "red");

        store.reset();
        assert_eq!(store.get(), Toast::default());
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).expect("serializable");
        assert_eq!(json, r#""warning""#);
    }
}
