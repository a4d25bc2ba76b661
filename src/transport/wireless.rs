//! # Wireless Link Transport
//!
//! Sends command buffers to a printer over a wireless link that accepts
//! data as discrete characteristic writes.
//!
//! ## Chunked Writes
//!
//! A single write is limited by the link's maximum transfer unit. Every
//! buffer is split into `max_chunk_bytes` pieces, and each piece is awaited
//! before the next is issued:
//!
//! ```text
//! buffer:  [───────────────── 300 bytes ─────────────────]
//! writes:  [── 128 ──] → [── 128 ──] → [─ 44 ─]
//! ```
//!
//! ## Link Setup
//!
//! ```text
//! discover(name prefix) ──► open(device) ──► resolve(service, characteristic)
//! ```
//!
//! ## Bluetooth Setup (Linux)
//!
//! [`RfcommAdapter`] drives a paired printer through BlueZ. The printer must
//! be paired once:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# scan on
//! # Look for the printer's advertised name, e.g. "LabelPrinter-1234"
//! [bluetooth]# pair XX:XX:XX:XX:XX:XX
//! ```
//!
//! The adapter then binds an RFCOMM device (`/dev/rfcommN`) on demand and
//! writes to it in raw mode.
//!
//! ## TTY Configuration
//!
//! The RFCOMM device is opened in raw mode so binary bitmap data is
//! transmitted without modification:
//!
//! - **No input processing**: Disable IGNBRK, BRKINT, PARMRK, ISTRIP, etc.
//! - **No output processing**: Disable OPOST (no CR/LF translation)
//! - **8-bit characters**: CS8 (8 data bits, no parity)
//! - **No echo**: Disable ECHO, ECHONL
//! - **Non-canonical mode**: Disable ICANON (no line buffering)

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{PrinterTransport, TransportError, TransportKind, is_link_lost_io};

/// Default chunk size for writes (bytes).
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 128;

/// Service most thermal label printers expose for print data.
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x000018f0_0000_1000_8000_00805f9b34fb);

/// Write characteristic within [`DEFAULT_SERVICE_UUID`].
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002af1_0000_1000_8000_00805f9b34fb);

/// Serial Port Profile, the only service an RFCOMM link carries.
pub const SERIAL_PORT_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805f9b34fb);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WirelessConfig {
    /// Devices whose advertised name starts with this are candidates.
    pub name_prefix: String,
    /// Skip discovery and use this address.
    pub address: Option<String>,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub max_chunk_bytes: usize,
    /// RFCOMM device number to bind (`/dev/rfcommN`).
    pub rfcomm_channel: u8,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            name_prefix: "Printer".to_string(),
            address: None,
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            rfcomm_channel: 0,
        }
    }
}

/// A device found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
}

/// Platform link API, one call per step.
#[async_trait]
pub trait LinkAdapter: Send {
    async fn discover(&mut self, name_prefix: &str) -> Result<DiscoveredDevice, TransportError>;

    async fn open(&mut self, device: &DiscoveredDevice) -> Result<(), TransportError>;

    async fn resolve(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), TransportError>;

    /// Write one chunk. Must not return until the chunk is handed to the link.
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// [`PrinterTransport`] over a [`LinkAdapter`].
pub struct WirelessTransport<A: LinkAdapter = RfcommAdapter> {
    adapter: A,
    config: WirelessConfig,
    device: Option<DiscoveredDevice>,
}

impl WirelessTransport<RfcommAdapter> {
    pub fn rfcomm(config: WirelessConfig) -> Self {
        let adapter = RfcommAdapter::new(config.rfcomm_channel);
        Self::new(adapter, config)
    }
}

impl<A: LinkAdapter> WirelessTransport<A> {
    pub fn new(adapter: A, config: WirelessConfig) -> Self {
        Self {
            adapter,
            config,
            device: None,
        }
    }

    pub fn device(&self) -> Option<&DiscoveredDevice> {
        self.device.as_ref()
    }
}

#[async_trait]
impl<A: LinkAdapter> PrinterTransport for WirelessTransport<A> {
    fn kind(&self) -> TransportKind {
        TransportKind::Wireless
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.config.max_chunk_bytes == 0 {
            return Err(TransportError::InvalidConfig(
                "max_chunk_bytes must be at least 1".into(),
            ));
        }
        let device = match &self.config.address {
            Some(address) => DiscoveredDevice {
                name: address.clone(),
                address: address.clone(),
            },
            None => self.adapter.discover(&self.config.name_prefix).await?,
        };
        self.adapter.open(&device).await?;
        info!(name = %device.name, address = %device.address, "wireless link open");
        self.device = Some(device);
        Ok(())
    }

    async fn create_session(&mut self) -> Result<(), TransportError> {
        if self.device.is_none() {
            return Err(TransportError::NotConnected);
        }
        self.adapter
            .resolve(self.config.service_uuid, self.config.characteristic_uuid)
            .await
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut writes = 0;
        for chunk in data.chunks(self.config.max_chunk_bytes.max(1)) {
            self.adapter.write_chunk(chunk).await?;
            writes += 1;
        }
        debug!(bytes = data.len(), writes, "wireless buffer written");
        Ok(writes)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.device = None;
        self.adapter.close().await
    }
}

// ============================================================================
// RFCOMM ADAPTER
// ============================================================================

/// BlueZ RFCOMM serial link.
///
/// Discovery and binding shell out to `bluetoothctl` and `rfcomm`; all
/// blocking work runs on the blocking pool.
pub struct RfcommAdapter {
    channel: u8,
    file: Option<File>,
}

impl RfcommAdapter {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            file: None,
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Setup(format!("Task error: {}", e)))?
}

#[async_trait]
impl LinkAdapter for RfcommAdapter {
    async fn discover(&mut self, name_prefix: &str) -> Result<DiscoveredDevice, TransportError> {
        let prefix = name_prefix.to_string();
        blocking(move || {
            let output = Command::new("bluetoothctl")
                .arg("devices")
                .output()
                .map_err(|e| TransportError::Setup(format!("Failed to run bluetoothctl: {}", e)))?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            parse_devices(&stdout)
                .into_iter()
                .find(|d| d.name.starts_with(&prefix))
                .ok_or_else(|| {
                    TransportError::NotFound(format!("no paired device named '{}*'", prefix))
                })
        })
        .await
    }

    async fn open(&mut self, device: &DiscoveredDevice) -> Result<(), TransportError> {
        if !is_valid_mac(&device.address) {
            return Err(TransportError::InvalidConfig(format!(
                "'{}' is not a Bluetooth address",
                device.address
            )));
        }
        let mac = device.address.clone();
        let channel = self.channel;
        let file = blocking(move || {
            let path = match find_rfcomm_for_mac(&mac)? {
                Some(path) => path,
                None => setup_rfcomm(&mac, channel)?,
            };
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|e| TransportError::ConnectFailed(format!("Failed to open {}: {}", path, e)))?;
            configure_tty(&file)?;
            Ok(file)
        })
        .await?;
        self.file = Some(file);
        Ok(())
    }

    async fn resolve(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), TransportError> {
        if self.file.is_none() {
            return Err(TransportError::NotConnected);
        }
        // RFCOMM carries one serial stream; the configured pair is not addressable.
        if service != SERIAL_PORT_UUID {
            debug!(%service, %characteristic, "RFCOMM link ignores service selection");
        }
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        let file = self.file.as_ref().ok_or(TransportError::NotConnected)?;
        let mut file = file.try_clone()?;
        let chunk = chunk.to_vec();
        blocking(move || {
            file.write_all(&chunk)
                .and_then(|_| file.flush())
                .map_err(|e| {
                    if is_link_lost_io(&e) {
                        TransportError::LinkLost
                    } else {
                        TransportError::WriteFailed(e.to_string())
                    }
                })
        })
        .await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.file = None;
        Ok(())
    }
}

/// Parse `bluetoothctl devices` output (`Device XX:XX:XX:XX:XX:XX Name`).
fn parse_devices(output: &str) -> Vec<DiscoveredDevice> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, ' ');
            if parts.next()? != "Device" {
                return None;
            }
            let address = parts.next()?;
            if !is_valid_mac(address) {
                return None;
            }
            Some(DiscoveredDevice {
                address: address.to_uppercase(),
                name: parts.next().unwrap_or("").trim().to_string(),
            })
        })
        .collect()
}

fn configure_tty(file: &File) -> Result<(), TransportError> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        configure_tty_raw(file.as_raw_fd())
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(())
    }
}

/// Configure a file descriptor for raw TTY mode.
///
/// This disables all input/output processing so binary data passes through
/// unmodified.
///
/// ## What Gets Disabled
///
/// - **Input flags**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL, IXON, IXOFF, IXANY
/// - **Output flags**: OPOST
/// - **Local flags**: ECHO, ECHONL, ICANON, ISIG, IEXTEN
/// - **Control flags**: CSIZE, PARENB (then CS8 is set)
///
/// XON/XOFF must be off: 0x11 and 0x13 appear in bitmap data.
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> Result<(), TransportError> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(TransportError::Setup(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(TransportError::Setup(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

// ============================================================================
// RFCOMM SETUP HELPERS
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Device name from a `/proc/net/rfcomm` or `rfcomm -a` line mentioning `mac`.
fn rfcomm_device_in(listing: &str, mac: &str) -> Option<String> {
    let mac_upper = mac.to_uppercase();
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(&mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|name| format!("/dev/{}", name.trim()))
        .find(|path| Path::new(path).exists())
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to the `rfcomm -a` command.
fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>, TransportError> {
    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        if let Some(path) = rfcomm_device_in(&contents, mac) {
            return Ok(Some(path));
        }
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| TransportError::Setup(format!("Failed to run 'rfcomm -a': {}", e)))?;
    Ok(rfcomm_device_in(&String::from_utf8_lossy(&output.stdout), mac))
}

/// Bind an RFCOMM device for a Bluetooth MAC address.
///
/// Runs `bluetoothctl connect`, then `rfcomm bind <channel> <MAC> 1`, and
/// returns the new device path. `rfcomm bind` needs root.
fn setup_rfcomm(mac: &str, channel: u8) -> Result<String, TransportError> {
    let mac_upper = mac.to_uppercase();
    let device_path = format!("/dev/rfcomm{}", channel);

    let output = Command::new("bluetoothctl")
        .arg("connect")
        .arg(&mac_upper)
        .output()
        .map_err(|e| TransportError::Setup(format!("Failed to run bluetoothctl: {}", e)))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !(stdout.contains("Connection successful") || stdout.contains("already connected")) {
        // rfcomm bind below is the real check.
        warn!(mac = %mac_upper, reply = %stdout.trim(), "bluetoothctl connect did not confirm");
    }

    thread::sleep(Duration::from_millis(500));

    let output = Command::new("rfcomm")
        .arg("bind")
        .arg(channel.to_string())
        .arg(&mac_upper)
        .arg("1") // RFCOMM channel 1 (standard for SPP)
        .output()
        .map_err(|e| TransportError::Setup(format!("Failed to run rfcomm bind: {}", e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError::ConnectFailed(format!(
            "rfcomm bind failed: {}",
            stderr.trim()
        )));
    }

    thread::sleep(Duration::from_millis(500));

    if !Path::new(&device_path).exists() {
        return Err(TransportError::ConnectFailed(format!(
            "Device {} was not created",
            device_path
        )));
    }

    info!(device = %device_path, mac = %mac_upper, "rfcomm device bound");
    Ok(device_path)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every chunk written.
    #[derive(Clone, Default)]
    struct RecordingAdapter {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        devices: Vec<DiscoveredDevice>,
        opened: Arc<Mutex<Option<DiscoveredDevice>>>,
    }

    #[async_trait]
    impl LinkAdapter for RecordingAdapter {
        async fn discover(&mut self, prefix: &str) -> Result<DiscoveredDevice, TransportError> {
            self.devices
                .iter()
                .find(|d| d.name.starts_with(prefix))
                .cloned()
                .ok_or_else(|| TransportError::NotFound(prefix.to_string()))
        }

        async fn open(&mut self, device: &DiscoveredDevice) -> Result<(), TransportError> {
            *self.opened.lock().unwrap() = Some(device.clone());
            Ok(())
        }

        async fn resolve(&mut self, _: Uuid, _: Uuid) -> Result<(), TransportError> {
            Ok(())
        }

        async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
            self.writes.lock().unwrap().push(chunk.to_vec());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn device(name: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            name: name.to_string(),
            address: "00:11:22:33:44:55".to_string(),
        }
    }

    #[tokio::test]
    async fn test_discovers_by_prefix() {
        let adapter = RecordingAdapter {
            devices: vec![device("Headphones"), device("LabelPro-42")],
            ..Default::default()
        };
        let opened = adapter.opened.clone();
        let mut transport = WirelessTransport::new(
            adapter,
            WirelessConfig {
                name_prefix: "LabelPro".into(),
                ..Default::default()
            },
        );
        transport.connect().await.unwrap();
        assert_eq!(opened.lock().unwrap().as_ref().unwrap().name, "LabelPro-42");
    }

    #[tokio::test]
    async fn test_no_matching_device() {
        let mut transport = WirelessTransport::new(RecordingAdapter::default(), WirelessConfig::default());
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_send_chunks_in_order() {
        let adapter = RecordingAdapter::default();
        let writes = adapter.writes.clone();
        let mut transport = WirelessTransport::new(
            adapter,
            WirelessConfig {
                address: Some("00:11:22:33:44:55".into()),
                max_chunk_bytes: 128,
                ..Default::default()
            },
        );
        transport.connect().await.unwrap();
        transport.create_session().await.unwrap();

        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        assert_eq!(transport.send(&data).await.unwrap(), 3);

        let writes = writes.lock().unwrap();
        let sizes: Vec<usize> = writes.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![128, 128, 44]);
        assert_eq!(writes.concat(), data);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let mut transport = WirelessTransport::new(
            RecordingAdapter::default(),
            WirelessConfig {
                max_chunk_bytes: 0,
                ..Default::default()
            },
        );
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_devices() {
        let out = "Device 00:11:22:33:44:55 LabelPro-42\nDevice AA:BB:CC:DD:EE:FF\nController 11:11:11:11:11:11 host\n";
        let devices = parse_devices(out);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "LabelPro-42");
        assert_eq!(devices[1].name, "");
    }

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL")); // invalid hex
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_default_uuids() {
        let config = WirelessConfig::default();
        assert_eq!(
            config.service_uuid.to_string(),
            "000018f0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(config.max_chunk_bytes, DEFAULT_MAX_CHUNK_BYTES);
    }
}
