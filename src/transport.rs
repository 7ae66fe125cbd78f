//! Raw HTTP transport for the login flow.
//!
//! The orchestrator drives redirects and cookies itself, so the client is
//! built with automatic redirect handling disabled and no cookie provider;
//! every response surfaces its raw status, `Set-Cookie` headers, `Location`
//! header, and body text.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderName, HeaderValue, LOCATION, SET_COOKIE};
use reqwest::redirect;
use tracing::{debug, warn};

use crate::config::LoginConfig;
use crate::login::LoginError;

/// Raw response surface exposed to the login steps.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Every `Set-Cookie` header value, in response order.
    pub set_cookie: Vec<String>,
    /// The `Location` header, when present.
    pub location: Option<String>,
    /// Response body decoded as text.
    pub body: String,
}

impl TransportResponse {
    /// Whether the response is a redirect (3xx).
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Performs GET/POST with caller-supplied headers, exposing the raw response.
///
/// Implementations must not follow redirects or retry: both behaviors belong
/// to the login state machine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET request.
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, LoginError>;

    /// Issues a form-encoded POST request.
    async fn post_form(
        &self,
        url: &str,
        headers: &[(String, String)],
        form: &[(String, String)],
    ) -> Result<TransportResponse, LoginError>;
}

/// The reqwest-backed [`Transport`] used outside of tests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport from the attempt's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Client`] when client construction fails.
    pub fn new(config: &LoginConfig) -> Result<Self, LoginError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::none())
            .gzip(true)
            .build()
            .map_err(LoginError::client)?;
        Ok(Self { client })
    }

    async fn execute(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<TransportResponse, LoginError> {
        let response = request
            .send()
            .await
            .map_err(|source| LoginError::network(url, source))?;

        let status = response.status().as_u16();
        let set_cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(String::from))
            .collect();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok().map(String::from));
        let body = response
            .text()
            .await
            .map_err(|source| LoginError::network(url, source))?;

        debug!(url, status, "transport response");
        Ok(TransportResponse {
            status,
            set_cookie,
            location,
            body,
        })
    }

    fn apply_headers(
        mut request: reqwest::RequestBuilder,
        url: &str,
        headers: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(url, header = %name, "skipping invalid request header"),
            }
        }
        request
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, LoginError> {
        let request = Self::apply_headers(self.client.get(url), url, headers);
        self.execute(url, request).await
    }

    async fn post_form(
        &self,
        url: &str,
        headers: &[(String, String)],
        form: &[(String, String)],
    ) -> Result<TransportResponse, LoginError> {
        let request = Self::apply_headers(self.client.post(url), url, headers).form(form);
        self.execute(url, request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(server: &MockServer) -> LoginConfig {
        LoginConfig::new(server.uri(), server.uri())
    }

    #[tokio::test]
    async fn test_get_exposes_status_cookies_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "sid=abc; Path=/")
                    .set_body_string("hello"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&test_config(&server)).unwrap();
        let response = transport
            .get(&format!("{}/page", server.uri()), &[])
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.set_cookie, vec!["sid=abc; Path=/".to_string()]);
        assert_eq!(response.body, "hello");
        assert!(response.location.is_none());
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/elsewhere"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&test_config(&server)).unwrap();
        let response = transport
            .get(&format!("{}/hop", server.uri()), &[])
            .await
            .unwrap();

        assert!(response.is_redirect());
        assert_eq!(response.location.as_deref(), Some("/elsewhere"));
    }

    #[tokio::test]
    async fn test_post_form_sends_caller_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("Cookie", "sid=abc"))
            .and(body_string_contains("v=1.2.3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"error_code\":0}"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&test_config(&server)).unwrap();
        let response = transport
            .post_form(
                &format!("{}/submit", server.uri()),
                &[("Cookie".to_string(), "sid=abc".to_string())],
                &[("v".to_string(), "1.2.3".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_network_failure_maps_to_network_error() {
        let config = LoginConfig::new("http://127.0.0.1:1", "http://127.0.0.1:1");
        let transport = HttpTransport::new(&config).unwrap();
        let result = transport.get("http://127.0.0.1:1/nope", &[]).await;
        assert!(matches!(result, Err(LoginError::Network { .. })));
    }
}
