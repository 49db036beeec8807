//! Application-wide constants for mesh-console.
//!
//! This module centralizes the magic numbers of the notice channel and the
//! request pipeline. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Reconnection**: Notice channel retry policy
//! - **Close codes**: Authoritative WebSocket close codes
//! - **Messages**: Operator-facing text shared by both subsystems
//! - **Endpoints**: Default URLs and API paths

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Session lifetime after login. Older sessions are reset on the next
/// expiration check.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

// ============================================================================
// Reconnection
// ============================================================================

/// Fixed delay between notice channel reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Reconnect attempts tolerated before the operator is told about it.
///
/// The attempt counter resets once it exceeds this value, so the failure
/// toast fires once per crossing rather than on every retry.
pub const RECONNECT_FAILURE_THRESHOLD: u32 = 10;

// ============================================================================
// Close codes
// ============================================================================

/// No status code was present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame (or never came up).
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Server closed the channel for a policy violation. Never retried.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Application code: caller is not authorized for the notice channel.
/// Never retried.
pub const CLOSE_UNAUTHORIZED: u16 = 3000;

// ============================================================================
// Messages
// ============================================================================

/// Suffix appended to request errors caused by an HTTP 401.
pub const UNAUTHORIZED_REQUEST_SUFFIX: &str =
    ". Unauthorized. Please check your login credentials and re-try.";

/// Alert text for a 3000 close while the session is admin-authenticated.
pub const CHANNEL_UNAUTHORIZED_TEXT: &str = "Unauthorized for server connection.";

/// Alert title used for generic request failures.
pub const REQUEST_ERROR_TITLE: &str = "Error!";

/// Toast color for failures.
pub const TOAST_COLOR_ERROR: &str = "red";

// ============================================================================
// Endpoints
// ============================================================================

/// Console base URL used when neither the config file nor the environment
/// names one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Notice channel path, relative to the base URL.
pub const NOTICES_WS_PATH: &str = "/manager/v2/notices/ws";

/// Management API password login endpoint.
pub const LOGIN_PATH: &str = "/manager/v2/login";

/// Management API logout endpoint.
pub const LOGOUT_PATH: &str = "/manager/v2/logout";

/// Mesh VPN API-key deletion endpoint. The empty prefix selects the key bound
/// to the current login.
pub const API_KEY_PATH: &str = "/vpn/api/v1/apikey/";

/// Prometheus instant query endpoint.
pub const METRICS_QUERY_PATH: &str = "/metrics/api/v1/query";

/// Prometheus range query endpoint.
pub const METRICS_QUERY_RANGE_PATH: &str = "/metrics/api/v1/query_range";

/// Range query resolution when the caller does not pick one.
pub const DEFAULT_RANGE_STEP: &str = "1d";

/// Header carrying the supervisor API key.
pub const API_KEY_HEADER: &str = "X-API-Key";
