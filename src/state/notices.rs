//! Notice sequence and channel status mirror.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::watch;

use crate::channel::ChannelStatus;

/// Newest-first list of server-pushed notice records.
///
/// Also mirrors the notice channel's connection status for indicators. The
/// status is `None` until the channel reports, and again after a reset.
#[derive(Debug)]
pub struct NoticeStore {
    notices: watch::Sender<VecDeque<Value>>,
    status: watch::Sender<Option<ChannelStatus>>,
}

impl Default for NoticeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (notices, _) = watch::channel(VecDeque::new());
        let (status, _) = watch::channel(None);
        Self { notices, status }
    }

    /// Insert a record at position 0.
    pub fn prepend(&self, notice: Value) {
        self.notices.send_modify(|list| list.push_front(notice));
    }

    /// Drop all records and forget the status.
    pub fn clear(&self) {
        self.notices.send_modify(VecDeque::clear);
        self.status.send_replace(None);
    }

    /// Copy of the records, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.notices.borrow().iter().cloned().collect()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notices.borrow().len()
    }

    /// `true` when no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notices.borrow().is_empty()
    }

    /// Watch the record list.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<VecDeque<Value>> {
        self.notices.subscribe()
    }

    /// Mirror a channel status change.
    pub fn set_status(&self, status: ChannelStatus) {
        self.status.send_if_modified(|current| {
            let changed = *current != Some(status);
            *current = Some(status);
            changed
        });
    }

    /// Last mirrored channel status.
    #[must_use]
    pub fn status(&self) -> Option<ChannelStatus> {
        *self.status.borrow()
    }

    /// Watch the status mirror.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<Option<ChannelStatus>> {
        self.status.subscribe()
    }

    /// Indicator color for the current status.
    #[must_use]
    pub fn status_color(&self) -> Option<&'static str> {
        self.status().map(ChannelStatus::color)
    }
}
