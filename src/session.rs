//! # Printer Sessions
//!
//! One connection to one printer, and the state machine around it.
//!
//! ```text
//!                 connect()            ok
//! Disconnected ─────────────► Connecting ─────► Connected ◄──────┐
//!      ▲                          │                 │            │ ok / failed
//!      │          failed          │      send()     ▼            │
//!      ├──────────────────────────┘             Sending ─────────┘
//!      │                                            │
//!      └──────────── link lost ─────────────────────┘ (from Connected or Sending)
//! ```
//!
//! State changes are published on a `watch` channel, so observers (the HTTP
//! status endpoint, a link monitor) never need the session lock.
//!
//! Sending requires a [`ConnectedSession`], obtained from
//! [`PrinterSession::connected`]. It mutably borrows the session, so two
//! sends on one session cannot overlap.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::MiseError;
use crate::transport::{PrinterTransport, TransportError, TransportKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Sending,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Sending => "sending",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The session is not in a state that allows sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No {kind} printer is connected (session is {state})")]
pub struct TransportUnavailable {
    pub kind: TransportKind,
    pub state: SessionState,
}

impl From<TransportUnavailable> for MiseError {
    fn from(e: TransportUnavailable) -> Self {
        MiseError::TransportUnavailable { kind: e.kind }
    }
}

/// Connect retry policy.
///
/// `max_attempts = 1` (the default) means no automatic retry: a failed
/// connect leaves the session disconnected until the operator tries again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt + 1` (0-indexed).
    ///
    /// delay = min(initial_delay * 2^attempt, max_delay), optionally jittered
    /// into `[delay / 2, delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let capped = base.min(self.max_delay);
        if !self.jitter {
            return capped;
        }

        // Clock nanoseconds are enough entropy to spread reconnects apart.
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let half = capped / 2;
        let range = capped.as_nanos().saturating_sub(half.as_nanos());
        if range == 0 {
            return capped;
        }
        half + Duration::from_nanos(((nanos as u128) % range) as u64)
    }
}

/// Cloneable handle for reporting a dropped link from outside the session.
#[derive(Clone)]
pub struct LinkMonitor {
    kind: TransportKind,
    state: watch::Sender<SessionState>,
}

impl LinkMonitor {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Mark the link as gone. No-op unless connected or sending.
    pub fn link_lost(&self) {
        let changed = self.state.send_if_modified(|state| {
            if matches!(state, SessionState::Connected | SessionState::Sending) {
                *state = SessionState::Disconnected;
                true
            } else {
                false
            }
        });
        if changed {
            warn!(transport = %self.kind, "printer link lost");
        }
    }
}

pub struct PrinterSession {
    transport: Box<dyn PrinterTransport>,
    state: watch::Sender<SessionState>,
    retry: RetryConfig,
}

impl PrinterSession {
    pub fn new(transport: Box<dyn PrinterTransport>) -> Self {
        Self::with_retry(transport, RetryConfig::default())
    }

    pub fn with_retry(transport: Box<dyn PrinterTransport>, retry: RetryConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            transport,
            state,
            retry,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn monitor(&self) -> LinkMonitor {
        LinkMonitor {
            kind: self.kind(),
            state: self.state.clone(),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Connect and create the device session.
    ///
    /// Already-connected sessions return immediately. Failures leave the
    /// session `Disconnected` and return the last error.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if matches!(self.state(), SessionState::Connected | SessionState::Sending) {
            return Ok(());
        }
        if self.retry.max_attempts == 0 {
            return Err(TransportError::InvalidConfig(
                "max_attempts must be >= 1".into(),
            ));
        }

        let kind = self.kind();
        self.set_state(SessionState::Connecting);

        let mut attempt = 0;
        loop {
            match self.try_connect().await {
                Ok(()) => {
                    self.set_state(SessionState::Connected);
                    info!(transport = %kind, attempts = attempt + 1, "printer connected");
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt >= self.retry.max_attempts {
                        self.set_state(SessionState::Disconnected);
                        warn!(transport = %kind, attempts = attempt, error = %e, "connect failed");
                        return Err(e);
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(
                        transport = %kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_connect(&mut self) -> Result<(), TransportError> {
        self.transport.connect().await?;
        if let Err(e) = self.transport.create_session().await {
            // Release the half-open link; the create_session error is what matters.
            let _ = self.transport.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), TransportError> {
        let result = self.transport.disconnect().await;
        self.set_state(SessionState::Disconnected);
        info!(transport = %self.kind(), "printer disconnected");
        result
    }

    /// Mark the link as gone.
    pub fn link_lost(&mut self) {
        self.monitor().link_lost();
    }

    /// Borrow the session for sending. Fails unless `Connected`.
    pub fn connected(&mut self) -> Result<ConnectedSession<'_>, TransportUnavailable> {
        match self.state() {
            SessionState::Connected => Ok(ConnectedSession { session: self }),
            state => Err(TransportUnavailable {
                kind: self.kind(),
                state,
            }),
        }
    }
}

/// A session known to be connected. The only way to send.
pub struct ConnectedSession<'a> {
    session: &'a mut PrinterSession,
}

impl ConnectedSession<'_> {
    pub fn kind(&self) -> TransportKind {
        self.session.kind()
    }

    /// Send one buffer. Returns the number of writes issued.
    ///
    /// On failure the session returns to `Connected`, or to `Disconnected`
    /// if the link is gone. Sends are never retried.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let session = &mut *self.session;
        if session.state() != SessionState::Connected {
            return Err(TransportError::NotConnected);
        }
        session.set_state(SessionState::Sending);

        let result = session.transport.send(data).await;

        let lost = matches!(&result, Err(e) if e.is_link_lost());
        session.state.send_modify(|state| {
            // A link-lost report during the send wins.
            if *state == SessionState::Sending {
                *state = if lost {
                    SessionState::Disconnected
                } else {
                    SessionState::Connected
                };
            }
        });
        if lost {
            warn!(transport = %session.kind(), "printer link lost during send");
        }
        result
    }
}
