//! Events emitted to the embedder during a login attempt.
//!
//! Events form a one-way, non-blocking notification stream. Per attempt
//! epoch the embedder sees `QrGenerated` exactly once, then at most one
//! `QrScanned`, and exactly one terminal event (`QrDeclined`,
//! `LoginComplete`, or `LoginError`); `QrExpired` replaces the terminal
//! event when the code times out and leaves the attempt waiting for a
//! retry or abort command.

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::cookie::CookieRecord;

/// QR feature flags returned by the generate endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QrOptions {
    /// Whether the service wants OCR verification on the scanning side.
    #[serde(rename = "enabledCheckOCR")]
    pub enabled_check_ocr: bool,
    /// Whether the code uses the multi-layer rendering.
    #[serde(rename = "enabledMultiLayer")]
    pub enabled_multi_layer: bool,
}

/// Identity extracted from the user-info payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserIdentity {
    /// Account identifier; empty when the service omitted it.
    pub uid: String,
    /// Display name; empty when the service omitted it.
    pub name: String,
    /// Avatar URL; empty when the service omitted it.
    pub avatar: String,
}

/// Exported session delivered with [`LoginEvent::LoginComplete`].
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Every cookie accumulated across the attempt, in capture order.
    pub cookies: Vec<CookieRecord>,
    /// Freshly minted device identifier.
    pub imei: String,
    /// The User-Agent the attempt authenticated with.
    pub user_agent: String,
    /// The extracted identity.
    pub user: UserIdentity,
}

/// One event in the attempt's notification stream.
#[derive(Debug, Clone)]
pub enum LoginEvent {
    /// A QR code is ready to display. `image` is the base64 PNG payload with
    /// the `data:image/png;base64,` prefix already stripped.
    QrGenerated {
        /// The QR token the service will correlate the scan with.
        code: String,
        /// Base64-encoded PNG, prefix stripped.
        image: String,
        /// Feature flags for rendering.
        options: QrOptions,
    },
    /// The QR code timed out before scan and confirmation both happened.
    QrExpired,
    /// The code was scanned on a phone; confirmation is still pending.
    QrScanned {
        /// Avatar URL of the scanning account.
        avatar: String,
        /// Display name of the scanning account.
        display_name: String,
    },
    /// The user declined the login on the phone.
    QrDeclined {
        /// The QR token that was declined.
        code: String,
    },
    /// The login finalized; the session is ready to use.
    LoginComplete(LoginSession),
    /// The attempt failed; exactly one of these per fatal error.
    LoginError {
        /// Human-readable description of the failure.
        message: String,
    },
}

/// Receives the attempt's events.
///
/// Delivery is fire-and-forget: the state machine never waits on the
/// observer, so implementations must hand work off (channel, queue) rather
/// than render inline.
pub trait LoginObserver: Send + Sync {
    /// Called once per emitted event, in emission order.
    fn on_event(&self, event: LoginEvent);
}

impl LoginObserver for mpsc::UnboundedSender<LoginEvent> {
    fn on_event(&self, event: LoginEvent) {
        // A dropped receiver means the embedder stopped listening; the flow
        // carries on regardless.
        let _ = self.send(event);
    }
}
