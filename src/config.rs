//! Per-attempt login configuration.
//!
//! A [`LoginConfig`] is immutable for the lifetime of a login attempt: the
//! orchestrator clones it once at start and never observes later changes.

use std::time::Duration;

use crate::user_agent;

/// Default QR-code validity window.
pub const DEFAULT_QR_TTL: Duration = Duration::from_millis(100_000);

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Configuration for one login attempt.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// Origin serving the login flow (landing page, acknowledgements, QR
    /// endpoints, session check), without a trailing slash.
    pub login_base: String,
    /// Origin serving the user-info endpoint. A different host than
    /// `login_base` in production.
    pub user_info_base: String,
    /// The `continue` parameter sent with every form post and the session
    /// check.
    pub continue_url: String,
    /// User-Agent for every request of the attempt.
    pub user_agent: String,
    /// How long a generated QR code stays valid before the attempt expires.
    pub qr_ttl: Duration,
    /// Transport connect timeout.
    pub connect_timeout: Duration,
    /// Transport read timeout.
    pub read_timeout: Duration,
}

impl LoginConfig {
    /// Creates a configuration for the given login and user-info origins.
    #[must_use]
    pub fn new(login_base: impl Into<String>, user_info_base: impl Into<String>) -> Self {
        let login_base = trim_base(login_base.into());
        let user_info_base = trim_base(user_info_base.into());
        let continue_url = format!("{login_base}/");
        Self {
            login_base,
            user_info_base,
            continue_url,
            user_agent: user_agent::default_login_user_agent(),
            qr_ttl: DEFAULT_QR_TTL,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }

    /// Overrides the `continue` URL.
    #[must_use]
    pub fn with_continue_url(mut self, continue_url: impl Into<String>) -> Self {
        self.continue_url = continue_url.into();
        self
    }

    /// Overrides the User-Agent for the attempt.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Overrides the QR validity window.
    #[must_use]
    pub fn with_qr_ttl(mut self, qr_ttl: Duration) -> Self {
        self.qr_ttl = qr_ttl;
        self
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = LoginConfig::new("https://id.example.com/", "https://chat.example.com");
        assert_eq!(config.login_base, "https://id.example.com");
        assert_eq!(config.user_info_base, "https://chat.example.com");
    }

    #[test]
    fn test_defaults() {
        let config = LoginConfig::new("https://id.example.com", "https://chat.example.com");
        assert_eq!(config.qr_ttl, DEFAULT_QR_TTL);
        assert_eq!(config.continue_url, "https://id.example.com/");
        assert!(config.user_agent.starts_with("qrlogin/"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = LoginConfig::new("https://id.example.com", "https://chat.example.com")
            .with_continue_url("https://chat.example.com/home")
            .with_user_agent("Mozilla/5.0 test")
            .with_qr_ttl(Duration::from_millis(250));
        assert_eq!(config.continue_url, "https://chat.example.com/home");
        assert_eq!(config.user_agent, "Mozilla/5.0 test");
        assert_eq!(config.qr_ttl, Duration::from_millis(250));
    }
}
