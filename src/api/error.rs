//! Request failure taxonomy.
//!
//! Every failure of the request pipeline is classified exactly once, at the
//! point where the response (or the lack of one) is seen, by
//! [`classify_failure`]. The classification decides how the failure reaches
//! the operator: [`ApiError::Unauthorized`] becomes a one-shot toast, every
//! other kind a sticky alert.

use serde_json::Value;

use crate::constants::UNAUTHORIZED_REQUEST_SUFFIX;
use crate::state::{Alert, AppState, Toast};

/// A classified request failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server rejected the session. The session has already been reset
    /// by the time this value exists.
    #[error("{0}")]
    Unauthorized(String),
    /// The server answered with a failure status.
    #[error("{0}")]
    Request(String),
    /// No response at all (connect failure, timeout, unreadable body).
    #[error("{0}")]
    Transport(String),
}

/// How a failure is shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Surface {
    /// Sticky banner, kept until dismissed or replaced.
    Alert(Alert),
    /// One-shot notification.
    Toast(Toast),
}

impl ApiError {
    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthorized(m) | Self::Request(m) | Self::Transport(m) => m,
        }
    }

    /// `true` for the session-invalidating kind.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Map the failure to its operator-facing form.
    #[must_use]
    pub fn surface(&self) -> Surface {
        match self {
            Self::Unauthorized(m) => Surface::Toast(Toast::error(m.clone())),
            Self::Request(m) | Self::Transport(m) => Surface::Alert(Alert::request_error(m.clone())),
        }
    }
}

/// Classify a failed request.
///
/// `status` is `None` when no response arrived. `body` is the already
/// camelized response body, if there was one.
///
/// A 401 resets the session (and everything derived from it) before
/// returning, so callers can never observe a rejected session as still
/// logged in.
pub fn classify_failure(
    state: &AppState,
    message: impl Into<String>,
    status: Option<u16>,
    body: Option<&Value>,
) -> ApiError {
    let mut message = message.into();

    let Some(status) = status else {
        log::warn!("[Api] Request failed without response: {message}");
        return ApiError::Transport(message);
    };

    if status == 401 {
        message.push_str(UNAUTHORIZED_REQUEST_SUFFIX);
        log::warn!("[Api] Session rejected by server, resetting");
        state.reset_session();
        return ApiError::Unauthorized(message);
    }

    if let Some(body) = body.filter(|b| !b.is_null()) {
        message.push_str(": ");
        message.push_str(&body.to_string());
    }
    log::warn!("[Api] Request failed: {message}");
    ApiError::Request(message)
}
