//! Shared User-Agent string for login-flow HTTP traffic.
//!
//! Single source for project URL and UA format so every step of the login
//! flow presents the same identity to the service.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/qrlogin-rs/qrlogin";

/// Default User-Agent for login-flow requests (identifies the client).
///
/// Embedders that need a browser-shaped UA override it through
/// [`crate::config::LoginConfig::with_user_agent`].
#[must_use]
pub(crate) fn default_login_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("qrlogin/{version} (chat-client-integration; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ua_carries_version_and_project_url() {
        let ua = default_login_user_agent();
        assert!(
            ua.contains(PROJECT_UA_URL),
            "UA must contain project URL: {ua}"
        );
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("qrlogin/")
                .and_then(|s| s.split(' ').next())
                .expect("UA has version"),
            "UA must contain crate version"
        );
    }
}
