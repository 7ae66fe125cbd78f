//! QR-code login orchestration for the chat platform client.
//!
//! This library drives the multi-round-trip QR login handshake against the
//! platform's account service: it fetches the login landing page, negotiates
//! the pre-login acknowledgements, generates a QR code, long-polls for the
//! two independent human actions (scanning the code, confirming on the
//! phone), and finalizes a confirmed login into an exported session.
//!
//! # Architecture
//!
//! - [`login`] - the login state machine, worker task, and emitted events
//! - [`cookie`] - per-attempt session cookie accumulation and matching
//! - [`transport`] - raw HTTP transport with redirects disabled
//! - [`config`] - per-attempt configuration
//! - [`version`] - build-version extraction from the landing page
//! - [`device`] - device identifier minting for exported sessions

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookie;
pub mod device;
pub mod login;
pub mod transport;
pub mod version;

mod user_agent;

// Re-export commonly used types
pub use config::{DEFAULT_QR_TTL, LoginConfig};
pub use cookie::{CookieRecord, CookieStore};
pub use login::{
    DECLINED_CODE, LoginError, LoginEvent, LoginHandle, LoginObserver, LoginSession, LoginState,
    MAX_REDIRECT_HOPS, PENDING_CODE, QrOptions, UserIdentity, start, start_with_transport,
};
pub use transport::{HttpTransport, Transport, TransportResponse};
