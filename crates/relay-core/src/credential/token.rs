use std::time::Duration;

use relay_model::TokenGrant;
use tokio::time::Instant;

use crate::error::ControlError;

/// Access/refresh token pair with its expiry.
///
/// Replaced wholesale on refresh or re-login, never mutated in place.
#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Instant,
    pub renewal_margin: Duration,
}

impl Credential {
    /// Builds a credential from a token grant received at `now`.
    pub fn from_grant(
        grant: TokenGrant,
        renewal_margin: Duration,
        now: Instant,
    ) -> Result<Self, ControlError> {
        let Some(access_token) = grant.access_token.filter(|t| !t.is_empty()) else {
            return Err(match grant.error_description {
                Some(desc) => ControlError::Auth(desc),
                None => ControlError::InvalidResponse("token grant without access_token".into()),
            });
        };

        Ok(Self {
            access_token,
            refresh_token: grant.refresh_token.filter(|t| !t.is_empty()),
            expires_at: now + Duration::from_secs(grant.expires_in.unwrap_or(0)),
            renewal_margin,
        })
    }

    /// A token is usable only while `now < expires_at - renewal_margin`.
    pub fn is_usable(&self, now: Instant) -> bool {
        self.expires_at
            .checked_duration_since(now)
            .is_some_and(|left| left > self.renewal_margin)
    }

    /// Same tokens, marked as already expired.
    pub fn expired(&self, now: Instant) -> Self {
        Self {
            expires_at: now,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("expires_at", &self.expires_at)
            .field("renewal_margin", &self.renewal_margin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(expires_in: u64) -> TokenGrant {
        TokenGrant {
            access_token: Some("a".into()),
            refresh_token: Some("r".into()),
            expires_in: Some(expires_in),
            error_description: None,
        }
    }

    #[test]
    fn usable_strictly_before_margin() {
        let now = Instant::now();
        let cred = Credential::from_grant(grant(300), Duration::from_secs(180), now).unwrap();

        assert!(cred.is_usable(now));
        assert!(cred.is_usable(now + Duration::from_secs(119)));
        assert!(!cred.is_usable(now + Duration::from_secs(120)));
        assert!(!cred.is_usable(now + Duration::from_secs(301)));
    }

    #[test]
    fn grant_with_description_is_auth_error() {
        let g = TokenGrant {
            error_description: Some("Bad credentials".into()),
            ..TokenGrant::default()
        };
        let err = Credential::from_grant(g, Duration::ZERO, Instant::now()).unwrap_err();
        assert_eq!(err, ControlError::Auth("Bad credentials".into()));
    }

    #[test]
    fn empty_refresh_token_is_dropped() {
        let mut g = grant(60);
        g.refresh_token = Some(String::new());
        let cred = Credential::from_grant(g, Duration::ZERO, Instant::now()).unwrap();
        assert!(cred.refresh_token.is_none());
    }
}
