//! Error types for the login flow.
//!
//! Every fatal error terminates the attempt and surfaces as exactly one
//! `login_error` event. Recoverable "still pending" poll responses and the
//! expired/declined outcomes never travel through this type.

use thiserror::Error;

/// Errors that can occur during a login attempt.
#[derive(Debug, Error)]
pub enum LoginError {
    /// Network-level failure (DNS, connection, TLS, timeout) on any step.
    #[error("network error calling {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response (anything other than the expected 200).
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The service answered with an error code outside the handled set.
    #[error("service error {code}: {message}")]
    Protocol {
        /// The service's error code.
        code: i64,
        /// The service's error message, when it sent one.
        message: String,
    },

    /// The response decoded but does not match any expected shape.
    #[error("invalid response structure: {context}")]
    Structure {
        /// What was being decoded when the shape failed to match.
        context: String,
    },

    /// The service reports the session as not logged in.
    #[error("login rejected: {context}")]
    Auth {
        /// The service's stated reason.
        context: String,
    },

    /// The session-check walk exceeded the redirect bound.
    #[error("too many redirects during session check (limit {limit})")]
    TooManyRedirects {
        /// The configured hop limit.
        limit: usize,
    },

    /// A URL built for a step is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// HTTP client construction failed.
    #[error("failed to construct HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl LoginError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a protocol error from a service error code.
    pub fn protocol(code: i64, message: Option<String>) -> Self {
        Self::Protocol {
            code,
            message: message.unwrap_or_else(|| "no message".to_string()),
        }
    }

    /// Creates a structural error.
    pub fn structure(context: impl Into<String>) -> Self {
        Self::Structure {
            context: context.into(),
        }
    }

    /// Creates an auth-rejected error.
    pub fn auth(context: impl Into<String>) -> Self {
        Self::Auth {
            context: context.into(),
        }
    }

    /// Creates a redirect-bound error.
    #[must_use]
    pub fn too_many_redirects(limit: usize) -> Self {
        Self::TooManyRedirects { limit }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a client construction error.
    #[must_use]
    pub fn client(source: reqwest::Error) -> Self {
        Self::Client { source }
    }
}

// We intentionally do NOT implement `From<reqwest::Error>`: the network and
// client variants require context the source error does not carry, so the
// helper constructors are the conversion points.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = LoginError::http_status("https://id.example.com/account/login", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "expected status in: {msg}");
        assert!(msg.contains("account/login"), "expected URL in: {msg}");
    }

    #[test]
    fn test_protocol_display_with_and_without_message() {
        let with = LoginError::protocol(-3, Some("session invalidated".to_string()));
        assert!(with.to_string().contains("-3"));
        assert!(with.to_string().contains("session invalidated"));

        let without = LoginError::protocol(-3, None);
        assert!(without.to_string().contains("no message"));
    }

    #[test]
    fn test_too_many_redirects_display() {
        let msg = LoginError::too_many_redirects(10).to_string();
        assert!(msg.contains("too many redirects"), "got: {msg}");
        assert!(msg.contains("10"), "expected limit in: {msg}");
    }

    #[test]
    fn test_structure_display() {
        let msg = LoginError::structure("login page did not contain a build version").to_string();
        assert!(msg.contains("invalid response structure"), "got: {msg}");
        assert!(msg.contains("build version"), "got: {msg}");
    }
}
