//! Runtime configuration.
//!
//! Every field has a usable default, so the service runs without a file.
//! A TOML file overrides the defaults and CLI flags override the file.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! render_timeout_ms = 10000
//! threshold = 128
//!
//! [encode]
//! gap_mm = 2
//! density = 8
//!
//! [bridge]
//! endpoint = "127.0.0.1:9100"
//! device = "kitchen"
//!
//! [wireless]
//! name_prefix = "LabelPro"
//! max_chunk_bytes = 128
//!
//! [retry]
//! max_attempts = 1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MiseError;
use crate::protocol::EncodeOptions;
use crate::render::DEFAULT_RENDER_TIMEOUT;
use crate::render::mono::DEFAULT_THRESHOLD;
use crate::session::RetryConfig;
use crate::transport::{BridgeConfig, WirelessConfig};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: String,
    pub render_timeout_ms: u64,
    /// Used when a request does not carry its own threshold.
    pub threshold: u8,
    pub encode: EncodeSettings,
    pub bridge: BridgeConfig,
    pub wireless: WirelessConfig,
    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            render_timeout_ms: DEFAULT_RENDER_TIMEOUT.as_millis() as u64,
            threshold: DEFAULT_THRESHOLD,
            encode: EncodeSettings::default(),
            bridge: BridgeConfig::default(),
            wireless: WirelessConfig::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, MiseError> {
        let config: Config =
            toml::from_str(text).map_err(|e| MiseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, MiseError> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    MiseError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), MiseError> {
        if self.render_timeout_ms == 0 {
            return Err(MiseError::Config("render_timeout_ms must be positive".into()));
        }
        if self.wireless.max_chunk_bytes == 0 {
            return Err(MiseError::Config(
                "wireless.max_chunk_bytes must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(MiseError::Config("retry.max_attempts must be at least 1".into()));
        }
        self.encode
            .options()
            .validate()
            .map_err(|e| MiseError::Config(format!("[encode]: {}", e)))?;
        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        }
    }
}

/// Printer settings that are not part of the label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodeSettings {
    pub gap_mm: f32,
    pub gap_offset_mm: f32,
    pub direction: u8,
    pub mirror: u8,
    pub density: Option<u8>,
    pub speed: Option<u8>,
    pub cut: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        let defaults = EncodeOptions::default();
        Self {
            gap_mm: defaults.gap_mm,
            gap_offset_mm: defaults.gap_offset_mm,
            direction: defaults.direction,
            mirror: defaults.mirror,
            density: defaults.density,
            speed: defaults.speed,
            cut: defaults.cut,
        }
    }
}

impl EncodeSettings {
    pub fn options(&self) -> EncodeOptions {
        EncodeOptions {
            gap_mm: self.gap_mm,
            gap_offset_mm: self.gap_offset_mm,
            direction: self.direction,
            mirror: self.mirror,
            density: self.density,
            speed: self.speed,
            cut: self.cut,
            ..EncodeOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Connect attempts, including the first. 1 = reconnect manually.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.listen, DEFAULT_LISTEN);
        assert_eq!(config.threshold, 128);
        assert_eq!(config.render_timeout(), DEFAULT_RENDER_TIMEOUT);
        assert_eq!(config.retry_config().max_attempts, 1);
        assert_eq!(config.encode.options(), EncodeOptions::default());
    }

    #[test]
    fn test_partial_file() {
        let config = Config::from_toml(
            r#"
            threshold = 100

            [encode]
            gap_mm = 2
            density = 8
            cut = true

            [wireless]
            name_prefix = "LabelPro"
            max_chunk_bytes = 20
            service_uuid = "49535343-fe7d-4ae5-8fa9-9fafd205e455"

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.threshold, 100);
        let options = config.encode.options();
        assert_eq!(options.gap_mm, 2.0);
        assert_eq!(options.density, Some(8));
        assert!(options.cut);
        assert_eq!(config.wireless.max_chunk_bytes, 20);
        assert_eq!(
            config.wireless.service_uuid.to_string(),
            "49535343-fe7d-4ae5-8fa9-9fafd205e455"
        );
        assert_eq!(config.bridge, BridgeConfig::default());
        assert_eq!(config.retry_config().max_attempts, 3);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml("[wireless]\nmax_chunk_bytes = 0").is_err());
        assert!(Config::from_toml("[retry]\nmax_attempts = 0").is_err());
        assert!(Config::from_toml("[encode]\ndensity = 20").is_err());
        assert!(Config::from_toml("unknown_key = 1").is_err());
    }

    #[test]
    fn test_rejects_unprintable_encode_settings() {
        for toml in [
            "[encode]\ndirection = 2",
            "[encode]\nmirror = 3",
            "[encode]\ngap_mm = -1.5",
            "[encode]\ngap_offset_mm = -0.5",
        ] {
            let err = Config::from_toml(toml).unwrap_err();
            assert!(matches!(err, MiseError::Config(_)), "{}: {:?}", toml, err);
        }
        assert!(Config::from_toml("[encode]\ndirection = 1\nmirror = 1\ngap_mm = 3").is_ok());
    }
}
