//! Session login/logout and the local "logged in" flag.
//!
//! The server authenticates with an HTTP-only cookie the client cannot
//! inspect, so the client keeps its own flag of whether a login succeeded.
//!
//! Logout always clears the local flag, whether or not the server call
//! succeeds, and never fails: a server-side failure is logged and
//! reported through [`LogoutOutcome::server_acknowledged`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gamma_core::Credentials;

use crate::api::{ApiError, GammaApi};

/// What happened on logout. The local session is always cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    /// `true` when the server answered the logout call with success.
    pub server_acknowledged: bool,
    /// Server acknowledgement text, or the error description.
    pub message: String,
}

/// Explicitly owned login state for one API client.
pub struct AuthSession {
    api: Arc<GammaApi>,
    logged_in: AtomicBool,
}

impl AuthSession {
    pub fn new(api: Arc<GammaApi>) -> Self {
        Self {
            api,
            logged_in: AtomicBool::new(false),
        }
    }

    /// Whether the last login succeeded and no logout happened since.
    pub fn is_authenticated(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// Log in; sets the local flag only on success.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, ApiError> {
        match self.api.login(credentials).await {
            Ok(message) => {
                self.logged_in.store(true, Ordering::SeqCst);
                tracing::info!(username = %credentials.username, "Logged in");
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(username = %credentials.username, error = %e, "Login failed");
                Err(e)
            }
        }
    }

    /// Log out. Clears the local flag unconditionally.
    pub async fn logout(&self) -> LogoutOutcome {
        let result = self.api.logout().await;
        self.logged_in.store(false, Ordering::SeqCst);

        match result {
            Ok(message) => {
                tracing::info!("Logged out");
                LogoutOutcome {
                    server_acknowledged: true,
                    message,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Logout failed on server, local session cleared anyway");
                LogoutOutcome {
                    server_acknowledged: false,
                    message: e.to_string(),
                }
            }
        }
    }
}
