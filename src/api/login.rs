//! Password login.

use serde::Deserialize;
use serde_json::json;

use super::{ApiClient, ApiError};
use crate::constants::LOGIN_PATH;
use crate::state::{Tenant, User};

/// Login response, after camelization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: User,
    tenant: Tenant,
    #[serde(default)]
    api_key: Option<String>,
}

/// Log in with a password and record the session.
///
/// The server sets its session cookie on the client's cookie store; the
/// returned user and tenant are written to the session store.
///
/// # Errors
///
/// Returns the classified request failure, or [`ApiError::Request`] when the
/// response does not describe a user and a tenant.
pub async fn password_login(client: &ApiClient, login: &str, password: &str) -> Result<(), ApiError> {
    let body = json!({ "loginName": login, "password": password });
    let response = client
        .post(LOGIN_PATH, Some(&body))
        .await?
        .ok_or_else(|| ApiError::Request("Login response was empty".to_string()))?;

    let LoginResponse {
        user,
        tenant,
        api_key,
    } = serde_json::from_value(response)
        .map_err(|e| ApiError::Request(format!("Unexpected login response: {e}")))?;

    client
        .state()
        .session
        .login(user, tenant, api_key.unwrap_or_default());
    Ok(())
}
