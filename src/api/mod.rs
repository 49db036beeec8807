//! Authenticated request pipeline.
//!
//! Every call to the console's APIs goes through [`ApiClient`], which
//! translates body key casing in both directions and classifies failures into
//! [`ApiError`]. [`try_request`] is the boundary where a classified failure
//! turns into something the operator sees.
//!
//! # Architecture
//!
//! ```text
//! caller ──> try_request ──> ApiClient::send
//!                 │               ├── encode_request_body   (decamelize)
//!                 │               ├── reqwest
//!                 │               ├── decode_response_body  (camelize)
//!                 │               └── classify_failure      (401 resets session)
//!                 ├── Unauthorized ──> ToastStore
//!                 └── anything else ──> returned Alert
//! ```

// Rust guideline compliant 2026-02

pub mod client;
pub mod error;
pub mod login;
pub mod logout;
pub mod metrics;
pub mod pipeline;

use std::future::Future;

pub use client::ApiClient;
pub use error::{classify_failure, ApiError, Surface};
pub use login::password_login;
pub use logout::logout;
pub use metrics::{get_count, CountQuery, CountResult, CountType, Sample};
pub use pipeline::{decode_response_body, encode_request_body};

use crate::state::{Alert, AppState};

/// Run a request and surface its failure.
///
/// Returns `None` on success. An unauthorized failure is routed to the toast
/// store and also yields `None`; any other failure is logged and returned as
/// an `Error!` alert for the caller to render.
pub async fn try_request<T, F>(state: &AppState, request: F) -> Option<Alert>
where
    F: Future<Output = Result<T, ApiError>>,
{
    try_request_value(state, request).await.err().flatten()
}

/// Like [`try_request`], but hands back the request's value on success.
///
/// # Errors
///
/// `Err(Some(alert))` for a failure the caller should render,
/// `Err(None)` for an unauthorized failure already shown as a toast.
pub async fn try_request_value<T, F>(state: &AppState, request: F) -> Result<T, Option<Alert>>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match request.await {
        Ok(value) => Ok(value),
        Err(e) => match e.surface() {
            Surface::Toast(toast) => {
                state.toast.set(toast);
                Err(None)
            }
            Surface::Alert(alert) => {
                log::error!("[Api] {}", alert.message);
                Err(Some(alert))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_yields_no_alert() {
        let state = AppState::default();
        let alert = try_request(&state, async { Ok::<_, ApiError>(()) }).await;
        assert!(alert.is_none());
        assert!(!state.toast.get().visible);
    }

    #[tokio::test]
    async fn test_unauthorized_goes_to_toast() {
        let state = AppState::default();
        let alert = try_request(&state, async {
            Err::<(), _>(ApiError::Unauthorized("denied".to_string()))
        })
        .await;
        assert!(alert.is_none());
        let toast = state.toast.get();
        assert!(toast.visible);
        assert_eq!(toast.message, "denied");
        assert_eq!(toast.color, "red");
    }

    #[tokio::test]
    async fn test_generic_failure_returns_alert() {
        let state = AppState::default();
        let alert = try_request(&state, async {
            Err::<(), _>(ApiError::Request("boom".to_string()))
        })
        .await
        .expect("alert");
        assert_eq!(alert.title.as_deref(), Some("Error!"));
        assert_eq!(alert.message, "boom");
        assert!(!state.toast.get().visible);
    }

    #[tokio::test]
    async fn test_try_request_value_passes_value_through() {
        let state = AppState::default();
        let value = try_request_value(&state, async { Ok::<_, ApiError>(42) }).await;
        assert_eq!(value, Ok(42));
    }
}
