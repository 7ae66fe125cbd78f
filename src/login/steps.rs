//! HTTP step functions for the login flow.
//!
//! Each network step is a pure request/response function: build headers
//! (including the attempt's `Cookie` header), issue the call, classify the
//! reply. No step retries at the transport level; every "try again"
//! behavior lives in the state machine.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::LoginConfig;
use crate::cookie::CookieStore;
use crate::device;
use crate::transport::{Transport, TransportResponse};
use crate::version::extract_version;

use super::error::LoginError;
use super::event::{LoginSession, QrOptions, UserIdentity};
use super::identity::extract_identity;

/// Service code for a long-poll round that returned with nothing to report.
pub const PENDING_CODE: i64 = -11;

/// Service code for a login declined on the phone.
pub const DECLINED_CODE: i64 = -13;

/// Redirect hops followed during the session check before giving up.
pub const MAX_REDIRECT_HOPS: usize = 10;

const QR_IMAGE_PREFIX: &str = "data:image/png;base64,";

const LOGIN_PAGE_PATH: &str = "/account/login";
const LOGIN_INFO_PATH: &str = "/account/login-info";
const VERIFY_CLIENT_PATH: &str = "/account/verify-client";
const QR_GENERATE_PATH: &str = "/account/authen/qr/generate";
const WAITING_SCAN_PATH: &str = "/account/authen/qr/waiting-scan";
const WAITING_CONFIRM_PATH: &str = "/account/authen/qr/waiting-confirm";
const CHECK_SESSION_PATH: &str = "/account/checksession";
const USER_INFO_PATH: &str = "/api/login/userinfo";

/// The service's JSON reply envelope.
#[derive(Debug, Deserialize)]
struct ServiceEnvelope {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QrGenerateData {
    code: String,
    image: String,
    options: QrOptions,
}

#[derive(Debug, Deserialize)]
struct ScanData {
    avatar: String,
    display_name: String,
}

/// Result of generating a QR code.
#[derive(Debug)]
pub(crate) struct QrPayload {
    pub(crate) code: String,
    /// Base64 PNG payload with the data-URL prefix stripped.
    pub(crate) image: String,
    pub(crate) options: QrOptions,
}

/// Result of the whole initialization sequence.
#[derive(Debug)]
pub(crate) struct InitOutcome {
    pub(crate) version: String,
    pub(crate) qr: QrPayload,
}

/// Classified waiting-scan reply.
#[derive(Debug)]
pub(crate) enum ScanPoll {
    Pending,
    Scanned { avatar: String, display_name: String },
}

/// Classified waiting-confirm reply.
#[derive(Debug)]
pub(crate) enum ConfirmPoll {
    Pending,
    Declined,
    Confirmed,
}

/// Shared context for one attempt's step functions.
///
/// Cheap to clone; a clone travels into the spawned task that runs the
/// step, sharing the attempt's cookie store. Retry replaces the store
/// wholesale, so a stale in-flight step keeps writing into a store nobody
/// reads again.
#[derive(Clone)]
pub(crate) struct StepContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: Arc<LoginConfig>,
    pub(crate) cookies: Arc<CookieStore>,
}

impl StepContext {
    /// Runs the full initialization sequence: landing page, the two
    /// acknowledgement posts, then QR generation.
    #[instrument(skip(self))]
    pub(crate) async fn initialize(&self) -> Result<InitOutcome, LoginError> {
        let version = self.fetch_login_page().await?;
        self.submit_ack(LOGIN_INFO_PATH, "login-info", &version)
            .await?;
        self.submit_ack(VERIFY_CLIENT_PATH, "verify-client", &version)
            .await?;
        let qr = self.generate_qr(&version).await?;
        Ok(InitOutcome { version, qr })
    }

    /// One waiting-scan long-poll round.
    pub(crate) async fn poll_scan(&self, code: &str, version: &str) -> Result<ScanPoll, LoginError> {
        let url = self.login_endpoint(WAITING_SCAN_PATH)?;
        let response = self.post_form(&url, &self.qr_form(code, version)).await?;
        ensure_ok(&url, &response)?;
        let envelope = decode_envelope("waiting-scan", &response.body)?;
        if envelope.error_code == PENDING_CODE {
            return Ok(ScanPoll::Pending);
        }
        if let Some(data) = envelope.data
            && let Ok(scan) = serde_json::from_value::<ScanData>(data)
        {
            return Ok(ScanPoll::Scanned {
                avatar: scan.avatar,
                display_name: scan.display_name,
            });
        }
        if envelope.error_code != 0 {
            return Err(LoginError::protocol(
                envelope.error_code,
                envelope.error_message,
            ));
        }
        Err(LoginError::structure(
            "waiting-scan response carried no scan payload",
        ))
    }

    /// One waiting-confirm long-poll round.
    pub(crate) async fn poll_confirm(
        &self,
        code: &str,
        version: &str,
    ) -> Result<ConfirmPoll, LoginError> {
        let url = self.login_endpoint(WAITING_CONFIRM_PATH)?;
        let response = self.post_form(&url, &self.qr_form(code, version)).await?;
        ensure_ok(&url, &response)?;
        let envelope = decode_envelope("waiting-confirm", &response.body)?;
        match envelope.error_code {
            PENDING_CODE => Ok(ConfirmPoll::Pending),
            DECLINED_CODE => Ok(ConfirmPoll::Declined),
            0 => Ok(ConfirmPoll::Confirmed),
            code => Err(LoginError::protocol(code, envelope.error_message)),
        }
    }

    /// Converts a confirmed QR login into an exported session: session-check
    /// redirect walk, user-info fetch, identity extraction, cookie export,
    /// device identifier mint.
    #[instrument(skip(self))]
    pub(crate) async fn finalize_login(&self) -> Result<LoginSession, LoginError> {
        self.check_session().await?;
        let user = self.fetch_user_info().await?;
        let imei = device::generate_device_id(&self.config.user_agent);
        Ok(LoginSession {
            cookies: self.cookies.export(),
            imei,
            user_agent: self.config.user_agent.clone(),
            user,
        })
    }

    async fn fetch_login_page(&self) -> Result<String, LoginError> {
        let mut url = self.login_endpoint(LOGIN_PAGE_PATH)?;
        url.query_pairs_mut()
            .append_pair("continue", &self.config.continue_url);
        let response = self.get(&url).await?;
        ensure_ok(&url, &response)?;
        extract_version(&response.body)
            .ok_or_else(|| LoginError::structure("login page did not contain a build version"))
    }

    async fn submit_ack(&self, path: &str, step: &str, version: &str) -> Result<(), LoginError> {
        let url = self.login_endpoint(path)?;
        let response = self.post_form(&url, &self.base_form(version)).await?;
        ensure_ok(&url, &response)?;
        match serde_json::from_str::<ServiceEnvelope>(&response.body) {
            Ok(envelope) if envelope.error_code == 0 => Ok(()),
            Ok(envelope) => Err(LoginError::protocol(
                envelope.error_code,
                envelope.error_message,
            )),
            Err(error) => {
                // The service sometimes answers these acknowledgement posts
                // with a non-JSON body and the flow still completes, so an
                // undecodable 200 is accepted.
                // TODO(review): confirm this never masks a real failure.
                warn!(step, %error, "acknowledgement body did not decode as JSON; continuing");
                Ok(())
            }
        }
    }

    async fn generate_qr(&self, version: &str) -> Result<QrPayload, LoginError> {
        let url = self.login_endpoint(QR_GENERATE_PATH)?;
        let response = self.post_form(&url, &self.base_form(version)).await?;
        ensure_ok(&url, &response)?;
        let envelope = decode_envelope("qr generate", &response.body)?;
        if envelope.error_code != 0 {
            return Err(LoginError::protocol(
                envelope.error_code,
                envelope.error_message,
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| LoginError::structure("qr generate response missing data"))?;
        let data: QrGenerateData = serde_json::from_value(data)
            .map_err(|error| LoginError::structure(format!("qr generate data: {error}")))?;
        let image = data
            .image
            .strip_prefix(QR_IMAGE_PREFIX)
            .unwrap_or(&data.image)
            .to_string();
        debug!(code = %data.code, "QR code generated");
        Ok(QrPayload {
            code: data.code,
            image,
            options: data.options,
        })
    }

    /// Walks the session-check redirect chain by hand, capturing cookies at
    /// every hop. A terminal 200 ends the walk.
    async fn check_session(&self) -> Result<(), LoginError> {
        let mut url = self.login_endpoint(CHECK_SESSION_PATH)?;
        url.query_pairs_mut()
            .append_pair("continue", &self.config.continue_url);
        let mut hops = 0usize;
        loop {
            let response = self.get(&url).await?;
            if response.status == 200 {
                debug!(hops, "session check complete");
                return Ok(());
            }
            if !response.is_redirect() {
                return Err(LoginError::http_status(url.as_str(), response.status));
            }
            hops += 1;
            if hops > MAX_REDIRECT_HOPS {
                return Err(LoginError::too_many_redirects(MAX_REDIRECT_HOPS));
            }
            let location = response.location.ok_or_else(|| {
                LoginError::structure("session-check redirect missing a Location header")
            })?;
            url = url
                .join(&location)
                .map_err(|_| LoginError::invalid_url(&location))?;
        }
    }

    async fn fetch_user_info(&self) -> Result<UserIdentity, LoginError> {
        let url = self.user_info_endpoint()?;
        let response = self.get(&url).await?;
        ensure_ok(&url, &response)?;
        let envelope = decode_envelope("user-info", &response.body)?;
        if envelope.error_code != 0 {
            return Err(LoginError::protocol(
                envelope.error_code,
                envelope.error_message,
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| LoginError::structure("user-info response missing data"))?;
        extract_identity(&data)
    }

    async fn get(&self, url: &Url) -> Result<TransportResponse, LoginError> {
        let response = self
            .transport
            .get(url.as_str(), &self.request_headers(url))
            .await?;
        self.capture_cookies(url, &response);
        Ok(response)
    }

    async fn post_form(
        &self,
        url: &Url,
        form: &[(String, String)],
    ) -> Result<TransportResponse, LoginError> {
        let response = self
            .transport
            .post_form(url.as_str(), &self.request_headers(url), form)
            .await?;
        self.capture_cookies(url, &response);
        Ok(response)
    }

    fn request_headers(&self, url: &Url) -> Vec<(String, String)> {
        let cookie = self.cookies.cookie_header(url);
        if cookie.is_empty() {
            Vec::new()
        } else {
            vec![("Cookie".to_string(), cookie)]
        }
    }

    fn capture_cookies(&self, url: &Url, response: &TransportResponse) {
        for set_cookie in &response.set_cookie {
            self.cookies.store(url, set_cookie);
        }
    }

    fn base_form(&self, version: &str) -> Vec<(String, String)> {
        vec![
            ("continue".to_string(), self.config.continue_url.clone()),
            ("v".to_string(), version.to_string()),
        ]
    }

    fn qr_form(&self, code: &str, version: &str) -> Vec<(String, String)> {
        let mut form = self.base_form(version);
        form.insert(0, ("code".to_string(), code.to_string()));
        form
    }

    fn login_endpoint(&self, path: &str) -> Result<Url, LoginError> {
        parse_url(&format!("{}{path}", self.config.login_base))
    }

    fn user_info_endpoint(&self) -> Result<Url, LoginError> {
        parse_url(&format!("{}{USER_INFO_PATH}", self.config.user_info_base))
    }
}

fn parse_url(raw: &str) -> Result<Url, LoginError> {
    Url::parse(raw).map_err(|_| LoginError::invalid_url(raw))
}

fn ensure_ok(url: &Url, response: &TransportResponse) -> Result<(), LoginError> {
    if response.status == 200 {
        Ok(())
    } else {
        Err(LoginError::http_status(url.as_str(), response.status))
    }
}

fn decode_envelope(step: &str, body: &str) -> Result<ServiceEnvelope, LoginError> {
    serde_json::from_str(body)
        .map_err(|error| LoginError::structure(format!("{step} response: {error}")))
}
