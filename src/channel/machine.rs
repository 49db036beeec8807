//! Pure state machine for the notice channel.
//!
//! [`ChannelMachine::step`] maps `(state, event)` to `(state, effects)` with
//! no I/O, no clocks and no sockets. The runner in [`super::runner`] turns the
//! returned [`Effect`]s into socket operations, timers and store writes.

use std::time::Duration;

use serde_json::Value;

use super::ChannelStatus;
use crate::casing::camelize_keys;
use crate::constants::{
    CHANNEL_UNAUTHORIZED_TEXT, CLOSE_POLICY_VIOLATION, CLOSE_UNAUTHORIZED, RECONNECT_DELAY,
    RECONNECT_FAILURE_THRESHOLD,
};
use crate::state::Alert;

/// Reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Attempts tolerated before the operator is notified.
    pub failure_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
            failure_threshold: RECONNECT_FAILURE_THRESHOLD,
        }
    }
}

/// Inputs to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Admin-authentication status of the session changed.
    SessionChanged {
        /// New admin-authenticated value.
        admin: bool,
    },
    /// Operator asked to connect.
    ConnectRequested,
    /// Transport finished its handshake.
    Connected,
    /// Transport closed (or never came up).
    Disconnected {
        /// WebSocket close code.
        code: u16,
        /// Close reason sent by the server.
        reason: String,
    },
    /// Transport reported an error. A `Disconnected` follows.
    TransportError(String),
    /// Text frame received.
    Message(String),
    /// The scheduled retry delay elapsed.
    RetryElapsed,
}

/// Work the runner must perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a new connection attempt.
    Open,
    /// Drop the current connection immediately, without a close handshake.
    ForceClose,
    /// Fire [`ChannelEvent::RetryElapsed`] after the delay.
    ScheduleRetry(Duration),
    /// Forget a scheduled retry.
    CancelRetry,
    /// Replace the channel alert (`None` clears it).
    SetAlert(Option<Alert>),
    /// Reconnection keeps failing; tell the operator.
    ReconnectFailed {
        /// Attempts made when the threshold was crossed.
        attempts: u32,
    },
    /// Put a normalized record at the head of the notice list.
    PrependNotice(Value),
    /// Mirror the new status.
    PublishStatus(ChannelStatus),
    /// An inbound frame was not JSON and was dropped.
    DiscardMessage {
        /// Parser error.
        error: String,
    },
}

/// Channel state. Cheap to copy; every transition returns a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMachine {
    status: ChannelStatus,
    admin: bool,
    close_code: Option<u16>,
    retry_count: u32,
    retry_pending: bool,
    policy: RetryPolicy,
}

impl ChannelMachine {
    /// Closed machine with the given policy and initial session status.
    ///
    /// The machine does not open by itself; feed it
    /// [`ChannelEvent::ConnectRequested`] to start when `admin` is `true`.
    #[must_use]
    pub fn new(policy: RetryPolicy, admin: bool) -> Self {
        Self {
            status: ChannelStatus::Closed,
            admin,
            close_code: None,
            retry_count: 0,
            retry_pending: false,
            policy,
        }
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    /// Close code of the most recent disconnect, until the next attempt.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        self.close_code
    }

    /// Reconnect attempts counted toward the failure threshold.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether a retry timer is running.
    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Last known admin-authentication status.
    #[must_use]
    pub fn admin(&self) -> bool {
        self.admin
    }

    /// Apply one event.
    #[must_use]
    pub fn step(mut self, event: &ChannelEvent) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();

        match event {
            ChannelEvent::SessionChanged { admin } => {
                if *admin == self.admin {
                    return (self, effects);
                }
                self.admin = *admin;
                if *admin {
                    if self.status == ChannelStatus::Closed {
                        self.open(&mut effects);
                    }
                } else {
                    self.force_close(&mut effects);
                }
            }

            ChannelEvent::ConnectRequested => {
                // Dropped while CONNECTING: only one attempt may be in flight.
                if self.admin && self.status == ChannelStatus::Closed {
                    self.open(&mut effects);
                }
            }

            ChannelEvent::Connected => {
                if self.status == ChannelStatus::Connecting {
                    self.status = ChannelStatus::Open;
                    self.retry_count = 0;
                    effects.push(Effect::PublishStatus(ChannelStatus::Open));
                    effects.push(Effect::SetAlert(None));
                }
            }

            ChannelEvent::Disconnected { code, reason } => {
                self.on_disconnected(*code, reason, &mut effects);
            }

            ChannelEvent::TransportError(_) => {}

            ChannelEvent::Message(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Null) => {}
                Ok(record) => effects.push(Effect::PrependNotice(camelize_keys(record))),
                Err(e) => effects.push(Effect::DiscardMessage {
                    error: e.to_string(),
                }),
            },

            ChannelEvent::RetryElapsed => {
                if !self.retry_pending {
                    return (self, effects);
                }
                self.retry_pending = false;
                if self.admin && self.status == ChannelStatus::Closed {
                    self.open(&mut effects);
                }
            }
        }

        (self, effects)
    }

    fn open(&mut self, effects: &mut Vec<Effect>) {
        if self.retry_pending {
            self.retry_pending = false;
            effects.push(Effect::CancelRetry);
        }
        self.status = ChannelStatus::Connecting;
        self.close_code = None;
        effects.push(Effect::Open);
        effects.push(Effect::PublishStatus(ChannelStatus::Connecting));
    }

    fn force_close(&mut self, effects: &mut Vec<Effect>) {
        if self.retry_pending {
            self.retry_pending = false;
            effects.push(Effect::CancelRetry);
        }
        if self.status != ChannelStatus::Closed {
            self.status = ChannelStatus::Closed;
            effects.push(Effect::ForceClose);
            effects.push(Effect::PublishStatus(ChannelStatus::Closed));
        }
    }

    fn on_disconnected(&mut self, code: u16, reason: &str, effects: &mut Vec<Effect>) {
        if self.status != ChannelStatus::Closed {
            self.status = ChannelStatus::Closed;
            effects.push(Effect::PublishStatus(ChannelStatus::Closed));
        }
        self.close_code = Some(code);

        match code {
            CLOSE_POLICY_VIOLATION => {
                let text = format!("Server notice connection is closed. {reason}");
                effects.push(Effect::SetAlert(Some(Alert::sticky(text.trim_end()))));
            }
            CLOSE_UNAUTHORIZED if self.admin => {
                effects.push(Effect::SetAlert(Some(Alert::sticky(
                    CHANNEL_UNAUTHORIZED_TEXT,
                ))));
            }
            _ => {}
        }

        let authoritative = code == CLOSE_POLICY_VIOLATION || code == CLOSE_UNAUTHORIZED;
        if self.retry_pending || !self.admin || authoritative {
            return;
        }

        self.retry_count += 1;
        if self.retry_count > self.policy.failure_threshold {
            effects.push(Effect::ReconnectFailed {
                attempts: self.retry_count,
            });
            self.retry_count = 0;
        }
        self.retry_pending = true;
        effects.push(Effect::ScheduleRetry(self.policy.delay));
    }
}
