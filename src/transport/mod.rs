//! # Printer Transport Layer
//!
//! This module provides communication backends for sending command buffers
//! to printers.
//!
//! ## Available Transports
//!
//! - [`bridge`]: Local print-service bridge (TCP)
//! - [`wireless`]: Wireless link with chunked characteristic writes (RFCOMM on Linux)
//!
//! Both implement [`PrinterTransport`]; sessions and the dispatcher only
//! ever see the trait.

pub mod bridge;
pub mod wireless;

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bridge::{BridgeConfig, BridgeService, BridgeTransport, TcpBridgeService};
pub use wireless::{DiscoveredDevice, LinkAdapter, RfcommAdapter, WirelessConfig, WirelessTransport};

/// The two ways a printer can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Bridge,
    Wireless,
}

impl TransportKind {
    pub const ALL: [TransportKind; 2] = [TransportKind::Bridge, TransportKind::Wireless];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Wireless => "wireless",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bridge" => Ok(Self::Bridge),
            "wireless" => Ok(Self::Wireless),
            other => Err(format!(
                "unknown transport '{}' (expected bridge or wireless)",
                other
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No device found: {0}")]
    NotFound(String),

    #[error("Device setup failed: {0}")]
    Setup(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Link to the printer was lost")]
    LinkLost,

    #[error("Invalid transport configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Transient failures that a later connect attempt may get past.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectFailed(_) | Self::Timeout(_) | Self::NotFound(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// The underlying link is gone; the session must reconnect.
    pub fn is_link_lost(&self) -> bool {
        match self {
            Self::LinkLost | Self::NotConnected => true,
            Self::Io(e) => is_link_lost_io(e),
            _ => false,
        }
    }
}

pub(crate) fn is_link_lost_io(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// A printer connection.
///
/// Connecting is two steps: [`connect`](Self::connect) reaches the endpoint,
/// [`create_session`](Self::create_session) prepares it for writes. Callers
/// run them in order and only send after both succeed.
#[async_trait]
pub trait PrinterTransport: Send {
    fn kind(&self) -> TransportKind;

    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn create_session(&mut self) -> Result<(), TransportError>;

    /// Write one command buffer. Returns the number of writes issued.
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_and_parse() {
        assert_eq!(TransportKind::Wireless.to_string(), "wireless");
        assert_eq!("Bridge".parse::<TransportKind>(), Ok(TransportKind::Bridge));
        assert!("usb".parse::<TransportKind>().is_err());
        assert_eq!(
            serde_json::to_string(&TransportKind::Bridge).unwrap(),
            "\"bridge\""
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(TransportError::Io(io::ErrorKind::ConnectionRefused.into()).is_retryable());
        assert!(!TransportError::InvalidConfig("x".into()).is_retryable());
        assert!(!TransportError::LinkLost.is_retryable());
    }

    #[test]
    fn test_link_lost_classification() {
        assert!(TransportError::LinkLost.is_link_lost());
        assert!(TransportError::Io(io::ErrorKind::BrokenPipe.into()).is_link_lost());
        assert!(!TransportError::WriteFailed("busy".into()).is_link_lost());
    }
}
