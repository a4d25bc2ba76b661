//! # Local Bridge Transport
//!
//! Sends command buffers through a print service running on the local
//! network or host, which owns the USB connection to the printer.
//!
//! ## Connection Steps
//!
//! ```text
//! connect(endpoint) ──► create_device(device) ──► write(buffer) ... ──► close()
//! ```
//!
//! Each step is awaited before the next. If either connect step fails the
//! transport holds no connection.
//!
//! The built-in [`TcpBridgeService`] speaks raw TCP: the bridge forwards
//! every byte it receives to the printer, so one write is one flush.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{PrinterTransport, TransportError, TransportKind, is_link_lost_io};

/// Default bridge endpoint (raw printing port on the local host).
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:9100";

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `host:port` of the print service.
    pub endpoint: String,
    /// Printer name as known to the bridge.
    pub device: String,
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            device: "label-printer".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Durations as integer milliseconds in config files.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// The print service's API, one call per step.
#[async_trait]
pub trait BridgeService: Send {
    async fn connect(&mut self, endpoint: &str, timeout: Duration) -> Result<(), TransportError>;

    async fn create_device(&mut self, device: &str) -> Result<(), TransportError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Bridge reached over a plain TCP stream.
#[derive(Default)]
pub struct TcpBridgeService {
    stream: Option<TcpStream>,
    device: Option<String>,
}

impl TcpBridgeService {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl BridgeService for TcpBridgeService {
    async fn connect(&mut self, endpoint: &str, timeout: Duration) -> Result<(), TransportError> {
        self.device = None;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", endpoint, e)))?;
        debug!(endpoint, "bridge endpoint reached");
        self.stream = Some(stream);
        Ok(())
    }

    async fn create_device(&mut self, device: &str) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Setup(format!("{}: {}", device, e)))?;
        // A half-open connection fails here rather than on the first write.
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::Setup(format!("{}: {}", device, e)))?;
        debug!(device, %peer, "bridge device ready");
        self.device = Some(device.to_string());
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.device.is_none() {
            return Err(TransportError::NotConnected);
        }
        let stream = self.stream()?;
        let result = async {
            stream.write_all(data).await?;
            stream.flush().await
        }
        .await;
        result.map_err(|e| {
            if is_link_lost_io(&e) {
                TransportError::LinkLost
            } else {
                TransportError::WriteFailed(e.to_string())
            }
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.device = None;
        if let Some(mut stream) = self.stream.take() {
            // The peer may already be gone; a failed shutdown still closes our side.
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}

/// [`PrinterTransport`] over a [`BridgeService`].
pub struct BridgeTransport<S: BridgeService = TcpBridgeService> {
    service: S,
    config: BridgeConfig,
}

impl BridgeTransport<TcpBridgeService> {
    pub fn tcp(config: BridgeConfig) -> Self {
        Self::new(TcpBridgeService::new(), config)
    }
}

impl<S: BridgeService> BridgeTransport<S> {
    pub fn new(service: S, config: BridgeConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

#[async_trait]
impl<S: BridgeService> PrinterTransport for BridgeTransport<S> {
    fn kind(&self) -> TransportKind {
        TransportKind::Bridge
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.service
            .connect(&self.config.endpoint, self.config.connect_timeout)
            .await
    }

    async fn create_session(&mut self) -> Result<(), TransportError> {
        self.service.create_device(&self.config.device).await?;
        info!(
            endpoint = %self.config.endpoint,
            device = %self.config.device,
            "bridge session created"
        );
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.service.write(data).await?;
        Ok(1)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.service.close().await
    }
}
