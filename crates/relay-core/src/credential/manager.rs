use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, error, info, warn};

use crate::{control::ControlPlane, credential::Credential, error::ControlError};

/// Account credentials used for a full login.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Login {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum AuthState {
    Unauthenticated,
    Authenticated(Credential),
    /// Credentials were rejected; not retried until the login changes.
    Failed(String),
}

/// Coarse view of [`AuthState`] at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    Valid,
    Expiring,
    Failed,
}

struct Inner {
    login: Login,
    state: AuthState,
}

/// Owns the agent's access token and renews it ahead of expiry.
///
/// The state lives behind an async mutex held across the token call, so concurrent callers
/// share a single renewal.
pub struct CredentialManager {
    control: Arc<dyn ControlPlane>,
    renewal_margin: Duration,
    inner: Mutex<Inner>,
}

impl CredentialManager {
    pub fn new(control: Arc<dyn ControlPlane>, login: Login, renewal_margin: Duration) -> Self {
        Self {
            control,
            renewal_margin,
            inner: Mutex::new(Inner {
                login,
                state: AuthState::Unauthenticated,
            }),
        }
    }

    /// Returns a token that is usable right now.
    ///
    /// A valid cached token is returned without any network call. An expiring token is
    /// refreshed when a refresh token is held, otherwise a full login is performed.
    pub async fn ensure_token(&self) -> Result<String, ControlError> {
        let mut inner = self.inner.lock().await;
        self.acquire(&mut inner).await
    }

    /// Renews after the server refused `stale` as expired.
    ///
    /// If another caller already replaced `stale`, the newer token is returned as is.
    pub async fn renew(&self, stale: &str) -> Result<String, ControlError> {
        let mut inner = self.inner.lock().await;
        if let AuthState::Authenticated(cred) = &inner.state
            && cred.access_token == stale
        {
            inner.state = AuthState::Authenticated(cred.expired(Instant::now()));
        }
        self.acquire(&mut inner).await
    }

    /// Installs new login credentials. A changed login re-arms a failed manager.
    pub async fn update_login(&self, login: Login) {
        let mut inner = self.inner.lock().await;
        if inner.login == login {
            return;
        }
        info!(email = %login.email, "login credentials changed");
        inner.login = login;
        if matches!(inner.state, AuthState::Failed(_)) {
            inner.state = AuthState::Unauthenticated;
        }
    }

    pub async fn state(&self) -> AuthState {
        self.inner.lock().await.state.clone()
    }

    pub async fn phase(&self) -> AuthPhase {
        match &self.inner.lock().await.state {
            AuthState::Unauthenticated => AuthPhase::Unauthenticated,
            AuthState::Failed(_) => AuthPhase::Failed,
            AuthState::Authenticated(c) if c.is_usable(Instant::now()) => AuthPhase::Valid,
            AuthState::Authenticated(_) => AuthPhase::Expiring,
        }
    }

    async fn acquire(&self, inner: &mut Inner) -> Result<String, ControlError> {
        let refresh = match &inner.state {
            AuthState::Failed(reason) => return Err(ControlError::Auth(reason.clone())),
            AuthState::Authenticated(c) if c.is_usable(Instant::now()) => {
                return Ok(c.access_token.clone());
            }
            AuthState::Authenticated(c) => c.refresh_token.clone(),
            AuthState::Unauthenticated => None,
        };

        match refresh {
            Some(refresh_token) => {
                info!("refreshing access token");
                let result = self
                    .control
                    .refresh_token(&refresh_token)
                    .await
                    .and_then(|g| Credential::from_grant(g, self.renewal_margin, Instant::now()));
                match result {
                    Ok(cred) => Ok(Self::install(inner, cred)),
                    Err(e) if e.is_auth() => {
                        warn!(error = %e, "refresh rejected, next attempt logs in again");
                        inner.state = AuthState::Unauthenticated;
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                info!(email = %inner.login.email, "requesting access token");
                let result = self
                    .control
                    .issue_token(&inner.login.email, &inner.login.password)
                    .await
                    .and_then(|g| Credential::from_grant(g, self.renewal_margin, Instant::now()));
                match result {
                    Ok(cred) => Ok(Self::install(inner, cred)),
                    Err(ControlError::Auth(reason)) => {
                        error!(reason = %reason, "credentials rejected");
                        inner.state = AuthState::Failed(reason.clone());
                        Err(ControlError::Auth(reason))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn install(inner: &mut Inner, cred: Credential) -> String {
        debug!(
            expires_in = ?cred.expires_at.saturating_duration_since(Instant::now()),
            "access token installed"
        );
        let token = cred.access_token.clone();
        inner.state = AuthState::Authenticated(cred);
        token
    }
}
