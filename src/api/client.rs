//! HTTP client for the console's management, supervisor and metrics APIs.
//!
//! This module provides [`ApiClient`], which runs every request through the
//! body transforms in [`super::pipeline`] and classifies every failure with
//! [`super::classify_failure`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;

use super::error::{classify_failure, ApiError};
use super::pipeline::{decode_response_body, encode_request_body};
use crate::config::Config;
use crate::constants::{self, API_KEY_HEADER};
use crate::state::SharedAppState;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Authenticated API client.
///
/// Session credentials travel in the cookie jar, which is shared with the
/// notice channel handshake through [`Self::cookie_jar`]. The supervisor API
/// key is sent as `X-API-Key`: the configured key if there is one, otherwise
/// the key handed out with the current login.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    cookies: Arc<Jar>,
    base_url: String,
    api_key: Option<String>,
    state: SharedAppState,
}

impl ApiClient {
    /// Creates a new API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Console base URL, e.g. `https://console.example.com`
    /// * `state` - Shared state the pipeline resets on a rejected session
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        state: SharedAppState,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&cookies))
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            cookies,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            state,
        })
    }

    /// Creates a client from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &Config, state: SharedAppState) -> Result<Self, ApiError> {
        let client = Self::new(&config.base_url, state, config.request_timeout())?;
        Ok(match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => client.with_api_key(key),
            _ => client,
        })
    }

    /// Creates a client with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults(base_url: impl Into<String>, state: SharedAppState) -> Result<Self, ApiError> {
        Self::new(base_url, state, constants::HTTP_REQUEST_TIMEOUT)
    }

    /// Use a fixed supervisor API key instead of the session's.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cookie jar holding the login session.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookies)
    }

    /// Returns the shared state this client reports into.
    pub fn state(&self) -> &SharedAppState {
        &self.state
    }

    /// `GET path?query`.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Option<Value>, ApiError> {
        self.send(Method::GET, path, query, None).await
    }

    /// `POST path` with an optional JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>, ApiError> {
        self.send(Method::POST, path, &[], body).await
    }

    /// `PUT path` with an optional JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>, ApiError> {
        self.send(Method::PUT, path, &[], body).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn delete(&self, path: &str) -> Result<Option<Value>, ApiError> {
        self.send(Method::DELETE, path, &[], None).await
    }

    /// Send one request through the pipeline.
    ///
    /// The body (application casing) is decamelized before sending; a JSON
    /// response is camelized before it is returned. `Ok(None)` means the
    /// server answered with an empty body.
    ///
    /// # Errors
    ///
    /// Returns the classified failure. A 401 has already reset the session
    /// when this returns.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("[Api] {method} {url}");

        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(key) = self.api_key_for_request() {
            request = request.header(API_KEY_HEADER, key);
        }
        if let Some(body) = body {
            let raw = serde_json::to_vec(body)
                .map_err(|e| ApiError::Request(format!("Failed to encode request body: {e}")))?;
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))
                .body(encode_request_body(Some(JSON_CONTENT_TYPE), raw));
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_failure(&self.state, e.to_string(), None, None))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_failure(&self.state, e.to_string(), None, None))?;
        let decoded = decode_response_body(content_type.as_deref(), &bytes);

        if status.is_success() {
            return Ok(decoded);
        }

        Err(classify_failure(
            &self.state,
            format!("Request failed with status code {}", status.as_u16()),
            Some(status.as_u16()),
            decoded.as_ref(),
        ))
    }

    fn api_key_for_request(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let session = self.state.session.snapshot();
        (!session.api_key.is_empty()).then_some(session.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client =
            ApiClient::with_defaults("https://console.example.com/", AppState::shared()).expect("client");
        assert_eq!(client.base_url(), "https://console.example.com");
    }

    #[test]
    fn test_configured_key_beats_session_key() {
        let state = AppState::shared();
        state.session.login(
            crate::state::session::tests::admin_user(),
            crate::state::session::tests::tenant(),
            "session-key",
        );
        let client = ApiClient::with_defaults("http://localhost", std::sync::Arc::clone(&state))
            .expect("client");
        assert_eq!(client.api_key_for_request().as_deref(), Some("session-key"));

        let client = client.with_api_key("fixed");
        assert_eq!(client.api_key_for_request().as_deref(), Some("fixed"));
    }

    #[test]
    fn test_no_key_without_session() {
        let client = ApiClient::with_defaults("http://localhost", AppState::shared()).expect("client");
        assert_eq!(client.api_key_for_request(), None);
    }
}
