//! QR-code login orchestration.
//!
//! One worker task owns each login attempt and processes commands and
//! network completions strictly one at a time, so no step of an attempt
//! ever runs concurrently with another. HTTP steps execute in spawned
//! tasks that post their outcome back to the worker's mailbox; the worker
//! therefore stays responsive to `abort`/`retry` while a long-poll is
//! outstanding.
//!
//! # Epochs
//!
//! Every continuation (a step outcome, a timer firing) carries the epoch
//! it was scheduled under. `retry`, `abort`, and expiry bump the attempt's
//! epoch, so a continuation from before the bump is discarded as a silent
//! no-op when it finally arrives. This is the sole cancellation mechanism:
//! in-flight network calls are never killed, their results just land dead.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use qrlogin::{LoginConfig, LoginEvent, start};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel::<LoginEvent>();
//! let config = LoginConfig::new("https://id.example.com", "https://chat.example.com");
//! let handle = start(config, Arc::new(events_tx))?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LoginEvent::QrGenerated { image, .. } => println!("render {image}"),
//!         LoginEvent::LoginComplete(session) => {
//!             println!("logged in as {}", session.user.name);
//!             break;
//!         }
//!         LoginEvent::QrExpired => handle.retry(),
//!         other => println!("{other:?}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod event;
mod identity;
mod steps;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::LoginConfig;
use crate::cookie::CookieStore;
use crate::transport::{HttpTransport, Transport};

use self::steps::{ConfirmPoll, InitOutcome, ScanPoll, StepContext};

pub use self::error::LoginError;
pub use self::event::{LoginEvent, LoginObserver, LoginSession, QrOptions, UserIdentity};
pub use self::identity::extract_identity;
pub use self::steps::{DECLINED_CODE, MAX_REDIRECT_HOPS, PENDING_CODE};

/// States of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Landing page, acknowledgements, and QR generation in progress.
    Initializing,
    /// QR displayed; long-polling for the phone scan.
    WaitingScan,
    /// Scan seen; long-polling for the on-phone confirmation.
    WaitingConfirm,
    /// Session exported; the attempt is finished.
    Complete,
    /// The QR code timed out; waiting for `retry` or `abort`.
    Expired,
    /// Aborted by command or declined on the phone.
    Aborted,
    /// A fatal error ended the attempt.
    Error,
}

impl LoginState {
    /// Whether the attempt is finished and the worker has stopped.
    ///
    /// `Expired` is deliberately not terminal: the worker stays addressable
    /// for `retry`/`abort`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted | Self::Error)
    }
}

/// Mailbox messages: external commands plus self-addressed continuations.
#[derive(Debug)]
enum Msg {
    Abort,
    Retry,
    InitDone {
        epoch: u64,
        outcome: Result<InitOutcome, LoginError>,
    },
    ScanDone {
        epoch: u64,
        outcome: Result<ScanPoll, LoginError>,
    },
    ConfirmDone {
        epoch: u64,
        outcome: Result<ConfirmPoll, LoginError>,
    },
    Expiry {
        epoch: u64,
    },
}

/// Handle to a running login attempt.
///
/// Dropping the handle aborts the attempt.
#[derive(Debug)]
pub struct LoginHandle {
    tx: mpsc::UnboundedSender<Msg>,
    state: watch::Receiver<LoginState>,
}

impl LoginHandle {
    /// Aborts the attempt. Fire-and-forget; a no-op once the attempt is
    /// finished.
    pub fn abort(&self) {
        let _ = self.tx.send(Msg::Abort);
    }

    /// Discards the attempt's cookies and QR code and restarts the flow
    /// from scratch. Fire-and-forget.
    pub fn retry(&self) {
        let _ = self.tx.send(Msg::Retry);
    }

    /// The attempt's current state.
    #[must_use]
    pub fn state(&self) -> LoginState {
        *self.state.borrow()
    }

    /// A watch receiver following the attempt's state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<LoginState> {
        self.state.clone()
    }
}

impl Drop for LoginHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Abort);
    }
}

/// Starts a login attempt with the default HTTP transport.
///
/// # Errors
///
/// Returns [`LoginError::Client`] when the HTTP client cannot be built.
pub fn start(
    config: LoginConfig,
    observer: Arc<dyn LoginObserver>,
) -> Result<LoginHandle, LoginError> {
    let transport = Arc::new(HttpTransport::new(&config)?);
    Ok(start_with_transport(config, transport, observer))
}

/// Starts a login attempt on a caller-supplied transport.
pub fn start_with_transport(
    config: LoginConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn LoginObserver>,
) -> LoginHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(LoginState::Initializing);

    let worker = LoginWorker {
        config: Arc::new(config),
        transport,
        observer,
        tx: tx.clone(),
        state_tx,
        state: LoginState::Initializing,
        epoch: 0,
        cookies: Arc::new(CookieStore::new()),
        version: None,
        qr_code: None,
        expiry_timer: None,
    };
    tokio::spawn(worker.run(rx));

    LoginHandle {
        tx,
        state: state_rx,
    }
}

/// The per-attempt worker: owns all mutable attempt state.
struct LoginWorker {
    config: Arc<LoginConfig>,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn LoginObserver>,
    /// Self-address for continuations.
    tx: mpsc::UnboundedSender<Msg>,
    state_tx: watch::Sender<LoginState>,
    state: LoginState,
    /// Bumped on retry, abort, and expiry; continuations from an older
    /// epoch are dropped on arrival.
    epoch: u64,
    cookies: Arc<CookieStore>,
    version: Option<String>,
    qr_code: Option<String>,
    expiry_timer: Option<JoinHandle<()>>,
}

impl LoginWorker {
    #[instrument(skip_all, fields(login_base = %self.config.login_base))]
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        self.begin_attempt();
        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
            if self.state.is_terminal() {
                break;
            }
        }
        self.cancel_expiry_timer();
        debug!(state = ?self.state, "login worker stopped");
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Abort => self.handle_abort(),
            Msg::Retry => self.handle_retry(),
            Msg::InitDone { epoch, outcome } => {
                if self.is_current(epoch, "initialize") {
                    self.handle_init_done(outcome);
                }
            }
            Msg::ScanDone { epoch, outcome } => {
                if self.is_current(epoch, "waiting-scan") {
                    self.handle_scan_done(outcome);
                }
            }
            Msg::ConfirmDone { epoch, outcome } => {
                if self.is_current(epoch, "waiting-confirm") {
                    self.handle_confirm_done(outcome).await;
                }
            }
            Msg::Expiry { epoch } => {
                if self.is_current(epoch, "expiry-timer") {
                    self.handle_expiry();
                }
            }
        }
    }

    /// Kicks off the initialization sequence under the current epoch.
    fn begin_attempt(&mut self) {
        self.set_state(LoginState::Initializing);
        let ctx = self.step_context();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = ctx.initialize().await;
            let _ = tx.send(Msg::InitDone { epoch, outcome });
        });
    }

    fn handle_abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        info!(epoch = self.epoch, state = ?self.state, "login attempt aborted");
        self.cancel_expiry_timer();
        self.epoch += 1;
        self.set_state(LoginState::Aborted);
    }

    fn handle_retry(&mut self) {
        info!(epoch = self.epoch, "restarting login attempt");
        self.cancel_expiry_timer();
        self.epoch += 1;
        self.cookies = Arc::new(CookieStore::new());
        self.version = None;
        self.qr_code = None;
        self.begin_attempt();
    }

    fn handle_init_done(&mut self, outcome: Result<InitOutcome, LoginError>) {
        match outcome {
            Ok(init) => {
                info!(version = %init.version, "login flow initialized");
                self.version = Some(init.version);
                self.qr_code = Some(init.qr.code.clone());
                self.emit(LoginEvent::QrGenerated {
                    code: init.qr.code,
                    image: init.qr.image,
                    options: init.qr.options,
                });
                self.arm_expiry_timer();
                self.set_state(LoginState::WaitingScan);
                self.spawn_scan_poll();
            }
            Err(error) => self.fail(error),
        }
    }

    fn handle_scan_done(&mut self, outcome: Result<ScanPoll, LoginError>) {
        if self.state != LoginState::WaitingScan {
            return;
        }
        match outcome {
            Ok(ScanPoll::Pending) => self.spawn_scan_poll(),
            Ok(ScanPoll::Scanned {
                avatar,
                display_name,
            }) => {
                info!("QR code scanned");
                self.emit(LoginEvent::QrScanned {
                    avatar,
                    display_name,
                });
                self.set_state(LoginState::WaitingConfirm);
                self.spawn_confirm_poll();
            }
            Err(error) => self.fail(error),
        }
    }

    async fn handle_confirm_done(&mut self, outcome: Result<ConfirmPoll, LoginError>) {
        if self.state != LoginState::WaitingConfirm {
            return;
        }
        match outcome {
            Ok(ConfirmPoll::Pending) => self.spawn_confirm_poll(),
            Ok(ConfirmPoll::Declined) => {
                info!("login declined on the phone");
                self.cancel_expiry_timer();
                self.emit(LoginEvent::QrDeclined {
                    code: self.qr_code.clone().unwrap_or_default(),
                });
                self.set_state(LoginState::Aborted);
            }
            Ok(ConfirmPoll::Confirmed) => {
                self.cancel_expiry_timer();
                match self.step_context().finalize_login().await {
                    Ok(session) => {
                        info!(uid = %session.user.uid, "login complete");
                        self.emit(LoginEvent::LoginComplete(session));
                        self.set_state(LoginState::Complete);
                    }
                    Err(error) => self.fail(error),
                }
            }
            Err(error) => self.fail(error),
        }
    }

    fn handle_expiry(&mut self) {
        if !matches!(
            self.state,
            LoginState::WaitingScan | LoginState::WaitingConfirm
        ) {
            return;
        }
        info!(epoch = self.epoch, "QR code expired");
        self.expiry_timer = None;
        self.emit(LoginEvent::QrExpired);
        self.set_state(LoginState::Expired);
        // A fresh epoch drops whatever poll is still in flight.
        self.epoch += 1;
    }

    fn spawn_scan_poll(&mut self) {
        let (Some(code), Some(version)) = (self.qr_code.clone(), self.version.clone()) else {
            self.fail(LoginError::structure("scan poll issued without a QR code"));
            return;
        };
        let ctx = self.step_context();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = ctx.poll_scan(&code, &version).await;
            let _ = tx.send(Msg::ScanDone { epoch, outcome });
        });
    }

    fn spawn_confirm_poll(&mut self) {
        let (Some(code), Some(version)) = (self.qr_code.clone(), self.version.clone()) else {
            self.fail(LoginError::structure(
                "confirm poll issued without a QR code",
            ));
            return;
        };
        let ctx = self.step_context();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = ctx.poll_confirm(&code, &version).await;
            let _ = tx.send(Msg::ConfirmDone { epoch, outcome });
        });
    }

    /// Arms the single expiry timer for the current epoch.
    ///
    /// The timer task is aborted on cancellation; the epoch check on the
    /// fire message is the backstop for the window where it already fired.
    fn arm_expiry_timer(&mut self) {
        self.cancel_expiry_timer();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        let ttl = self.config.qr_ttl;
        self.expiry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = tx.send(Msg::Expiry { epoch });
        }));
    }

    fn cancel_expiry_timer(&mut self) {
        if let Some(timer) = self.expiry_timer.take() {
            timer.abort();
        }
    }

    fn fail(&mut self, error: LoginError) {
        warn!(epoch = self.epoch, error = %error, "login attempt failed");
        self.cancel_expiry_timer();
        self.emit(LoginEvent::LoginError {
            message: error.to_string(),
        });
        self.set_state(LoginState::Error);
    }

    fn is_current(&self, epoch: u64, kind: &str) -> bool {
        if epoch == self.epoch {
            true
        } else {
            debug!(
                kind,
                stale_epoch = epoch,
                current_epoch = self.epoch,
                "dropping stale continuation"
            );
            false
        }
    }

    fn set_state(&mut self, state: LoginState) {
        debug!(from = ?self.state, to = ?state, "state transition");
        self.state = state;
        let _ = self.state_tx.send(state);
    }

    fn emit(&self, event: LoginEvent) {
        self.observer.on_event(event);
    }

    fn step_context(&self) -> StepContext {
        StepContext {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
            cookies: Arc::clone(&self.cookies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LoginState::Complete.is_terminal());
        assert!(LoginState::Aborted.is_terminal());
        assert!(LoginState::Error.is_terminal());
        assert!(!LoginState::Expired.is_terminal());
        assert!(!LoginState::Initializing.is_terminal());
        assert!(!LoginState::WaitingScan.is_terminal());
        assert!(!LoginState::WaitingConfirm.is_terminal());
    }
}
