use std::{future::Future, sync::Arc};

use tracing::debug;

use crate::{control::ControlPlane, credential::CredentialManager, error::ControlError};

/// Authenticated access to the control server.
///
/// [`call`](Self::call) obtains a token, runs the request, and on a `TokenExpired` reply
/// renews once and replays the request once. A second expiry is returned to the caller.
#[derive(Clone)]
pub struct ControlSession {
    control: Arc<dyn ControlPlane>,
    credentials: Arc<CredentialManager>,
}

impl ControlSession {
    pub fn new(control: Arc<dyn ControlPlane>, credentials: Arc<CredentialManager>) -> Self {
        Self {
            control,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ControlError>
    where
        F: Fn(Arc<dyn ControlPlane>, String) -> Fut,
        Fut: Future<Output = Result<T, ControlError>>,
    {
        let token = self.credentials.ensure_token().await?;
        match op(Arc::clone(&self.control), token.clone()).await {
            Err(ControlError::TokenExpired) => {
                debug!("token refused as expired; renewing and replaying once");
                let fresh = self.credentials.renew(&token).await?;
                op(Arc::clone(&self.control), fresh).await
            }
            other => other,
        }
    }
}
