//! Operator session state.
//!
//! The session is the authenticated operator context: who is logged in, for
//! which tenant, and whether the admin context is active. It is written on
//! login, explicit logout, and when the request pipeline sees a
//! session-invalidating response. Everything else only reads it, or watches
//! it through [`SessionStore::subscribe`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::constants::SESSION_TTL;

/// One login method attached to a user (password, OAuth, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserLogin {
    /// Login identifier (email, username, provider subject).
    pub login: String,
    /// Optional human-readable name for this login.
    pub display_name: Option<String>,
}

/// Logged-in user, as returned (camelized) by the management API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    /// Server-side user identifier.
    pub user_id: String,
    /// Preferred display name.
    pub display_name: Option<String>,
    /// Tenant administrator.
    pub is_admin: bool,
    /// System-wide administrator.
    pub is_sys_admin: bool,
    /// Role names, e.g. `network-admin`.
    pub roles: Vec<String>,
    /// Login methods, primary first.
    pub logins: Vec<UserLogin>,
}

/// Tenant the operator is acting for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: String,
    /// Tenant display name.
    pub name: String,
    /// Mesh namespace owned by the tenant.
    pub namespace: String,
}

/// Snapshot of the operator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Logged-in user, if any.
    pub user: Option<User>,
    /// Active tenant, if any.
    pub tenant: Option<Tenant>,
    /// Supervisor API key handed out at login (may be empty).
    pub api_key: String,
    /// Whether the operator is acting in the admin context.
    pub admin_context: bool,
    /// Cleared whenever the server rejects the session's credentials.
    pub credentials_valid: bool,
    /// When the session was established.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            tenant: None,
            api_key: String::new(),
            admin_context: true,
            credentials_valid: false,
            updated_at: None,
        }
    }
}

impl Session {
    /// A user and a tenant are both present.
    #[must_use]
    pub fn authenticated(&self) -> bool {
        self.user.is_some() && self.tenant.is_some()
    }

    /// User is a tenant admin and the admin context is active.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin_context && self.user.as_ref().is_some_and(|u| u.is_admin)
    }

    /// The condition that gates the notice channel.
    #[must_use]
    pub fn is_admin_authenticated(&self) -> bool {
        self.authenticated() && self.is_admin()
    }

    /// User is a system admin and the admin context is active.
    #[must_use]
    pub fn is_sys_admin(&self) -> bool {
        self.admin_context && self.user.as_ref().is_some_and(|u| u.is_sys_admin)
    }

    /// User holds the `network-admin` role and the admin context is active.
    #[must_use]
    pub fn is_network_admin(&self) -> bool {
        self.admin_context
            && self
                .user
                .as_ref()
                .is_some_and(|u| u.roles.iter().any(|r| r == "network-admin"))
    }

    /// Namespace of the active tenant.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.tenant.as_ref().map(|t| t.namespace.as_str())
    }

    /// Best name to show for the operator.
    ///
    /// Display name, else the first login's display name, else the first
    /// login's identifier.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        let user = self.user.as_ref()?;
        if let Some(name) = user.display_name.as_deref() {
            return Some(name);
        }
        let first = user.logins.first()?;
        Some(first.display_name.as_deref().unwrap_or(&first.login))
    }
}

/// Process-wide session container.
///
/// Backed by a `watch` channel so the notice channel (and any UI) can react
/// to admin-authentication changes. Resets bump [`Self::epoch`].
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Session>,
    epoch: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty, unauthenticated store.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self {
            tx,
            epoch: AtomicU64::new(0),
        }
    }

    /// Current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// Shortcut for `snapshot().is_admin_authenticated()` without cloning.
    #[must_use]
    pub fn is_admin_authenticated(&self) -> bool {
        self.tx.borrow().is_admin_authenticated()
    }

    /// Whether anyone is logged in.
    #[must_use]
    pub fn logged_in(&self) -> bool {
        self.tx.borrow().authenticated()
    }

    /// Watch the session for changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Record a successful login.
    pub fn login(&self, user: User, tenant: Tenant, api_key: impl Into<String>) {
        let api_key = api_key.into();
        log::info!(
            "[Session] Logged in as {} (tenant {})",
            user.user_id,
            tenant.namespace
        );
        self.tx.send_modify(|s| {
            s.user = Some(user);
            s.tenant = Some(tenant);
            s.api_key = api_key;
            s.credentials_valid = true;
            s.updated_at = Some(Utc::now());
        });
    }

    /// Switch between the admin and the personal context.
    pub fn set_admin_context(&self, admin: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.admin_context != admin;
            s.admin_context = admin;
            changed
        });
    }

    /// Drop the whole session.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(Session::default());
        log::info!("[Session] Session reset");
    }

    /// Number of resets so far.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Reset the session if it is older than [`SESSION_TTL`].
    ///
    /// Returns `true` if the session was reset. An empty session is left
    /// alone.
    pub fn check_expiration(&self, now: DateTime<Utc>) -> bool {
        let expired = {
            let session = self.tx.borrow();
            if !session.authenticated() && session.api_key.is_empty() {
                return false;
            }
            session.updated_at.is_none_or(|at| {
                (now - at)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed >= SESSION_TTL)
            })
        };
        if expired {
            log::info!("[Session] Session expired");
            self.reset();
        }
        expired
    }
}
