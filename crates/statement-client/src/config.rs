//! Client configuration
//!
//! Handles the API location, credentials and transport timeout.

use std::time::Duration;

use crate::error::ClientError;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for the statement API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL, without the `/api/v1` prefix
    pub base_url: String,
    /// Bearer token sent on every request
    pub token: Option<String>,
    /// Raw `Cookie` header carrying the browser session
    pub session_cookie: Option<String>,
    /// Transport timeout per request
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            session_cookie: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_session_cookie(mut self, cookie: &str) -> Self {
        self.session_cookie = Some(cookie.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - STATEMENT_API_URL: Base URL (default: "http://localhost:8080")
    /// - STATEMENT_API_TOKEN: Bearer token
    /// - STATEMENT_SESSION_COOKIE: Session cookie header value
    /// - STATEMENT_API_TIMEOUT_SECS: Request timeout in seconds (default: 60)
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let base_url = lookup("STATEMENT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&base_url);

        config.token = lookup("STATEMENT_API_TOKEN").filter(|t| !t.is_empty());
        config.session_cookie = lookup("STATEMENT_SESSION_COOKIE").filter(|c| !c.is_empty());

        if let Some(raw) = lookup("STATEMENT_API_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::InvalidConfig(format!("STATEMENT_API_TIMEOUT_SECS: {}", raw))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Absolute URL of an `/api/v1` endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }
}
