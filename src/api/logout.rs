//! Operator logout.

use super::{try_request, ApiClient, ApiError};
use crate::constants::{API_KEY_PATH, LOGOUT_PATH};
use crate::state::Toast;

/// Log the operator out.
///
/// Does nothing when nobody is logged in. Otherwise the local session (and
/// the notices tied to it) is dropped first, so the notice channel closes
/// without waiting on the network. The server-side logout and the API-key
/// deletion are then both attempted; if either fails the combined message is
/// shown as a red toast, unless `ignore_errors` is set.
pub async fn logout(client: &ApiClient, ignore_errors: bool) {
    let state = client.state();
    if !state.session.logged_in() {
        return;
    }
    state.reset_session();

    let alert = try_request(state, async {
        let logout = client.post(LOGOUT_PATH, None).await.err();
        let delete_key = client.delete(API_KEY_PATH).await;
        if delete_key.is_ok() {
            log::info!("[Api] API key deleted");
        }

        let failures: Vec<String> = [logout, delete_key.err()]
            .into_iter()
            .flatten()
            .map(|e| e.to_string())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Request(failures.join(" ")))
        }
    })
    .await;

    if let Some(alert) = alert {
        if ignore_errors {
            log::debug!("[Api] Ignoring logout failure: {}", alert.message);
        } else {
            state.toast.set(Toast::error(alert.message));
        }
    }
}
