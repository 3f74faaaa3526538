use std::time::Duration;

use crate::error::ClientError;

/// Settings of the HTTP transport.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Base URL of the control server.
    pub server_url: String,
    /// Proxy applied to all control-server and blob traffic.
    pub proxy: Option<String>,
    pub timeout: Duration,
    /// OAuth client credentials sent as HTTP basic auth to the token endpoint.
    pub client_id: String,
    pub client_secret: String,
}

impl ControlConfig {
    pub const DEFAULT_CLIENT: &'static str = "kit_uploader";

    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.server_url.trim().is_empty() {
            return Err(ClientError::InvalidConfig("server_url is empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig("timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            proxy: None,
            timeout: Duration::from_secs(60),
            client_id: Self::DEFAULT_CLIENT.to_string(),
            client_secret: Self::DEFAULT_CLIENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_server_url_is_rejected() {
        assert!(ControlConfig::default().validate().is_err());
        assert!(ControlConfig::new("http://127.0.0.1:8080").validate().is_ok());
    }

    #[test]
    fn blank_proxy_is_ignored() {
        let cfg = ControlConfig::new("http://srv").with_proxy(Some("  ".into()));
        assert!(cfg.proxy.is_none());
    }
}
