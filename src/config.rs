//! Configuration loading and defaults.

use crate::defaults;
use crate::error::{Result, VoxrelayError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub recognition: RecognitionConfig,
    pub relay: RelayConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; None means the system default.
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Nominal frame duration in milliseconds.
    pub frame_ms: u32,
}

/// Recognition backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub url: String,
    pub language: String,
    pub interim_results: bool,
    /// Seconds of audio forwarded per stream before it is reopened.
    pub stream_lifetime_secs: u64,
    /// Consecutive stream-open failures tolerated before giving up.
    pub max_retries: u32,
}

/// Command relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub url: String,
    pub ack_timeout_ms: u64,
    /// Consecutive connect failures tolerated before giving up.
    pub max_consecutive_failures: u32,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            url: defaults::RECOGNIZER_URL.to_string(),
            language: defaults::LANGUAGE.to_string(),
            interim_results: true,
            stream_lifetime_secs: defaults::STREAM_LIFETIME_SECS,
            max_retries: defaults::MAX_STREAM_RETRIES,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: defaults::RELAY_URL.to_string(),
            ack_timeout_ms: defaults::ACK_TIMEOUT_MS,
            max_consecutive_failures: defaults::MAX_DISPATCH_FAILURES,
            reconnect_base_ms: defaults::RECONNECT_BASE_MS,
            reconnect_max_ms: defaults::RECONNECT_MAX_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxrelayError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoxrelayError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only falls back to defaults when the file is missing; invalid TOML is
    /// still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VoxrelayError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(VoxrelayError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.audio.frame_ms == 0 {
            return Err(VoxrelayError::ConfigInvalidValue {
                key: "audio.frame_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.recognition.stream_lifetime_secs == 0 {
            return Err(VoxrelayError::ConfigInvalidValue {
                key: "recognition.stream_lifetime_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXRELAY_RECOGNIZER_URL → recognition.url
    /// - VOXRELAY_RELAY_URL → relay.url
    /// - VOXRELAY_LANGUAGE → recognition.language
    /// - VOXRELAY_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("VOXRELAY_RECOGNIZER_URL")
            && !url.is_empty()
        {
            self.recognition.url = url;
        }

        if let Ok(url) = std::env::var("VOXRELAY_RELAY_URL")
            && !url.is_empty()
        {
            self.relay.url = url;
        }

        if let Ok(language) = std::env::var("VOXRELAY_LANGUAGE")
            && !language.is_empty()
        {
            self.recognition.language = language;
        }

        if let Ok(device) = std::env::var("VOXRELAY_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxrelay/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxrelay")
            .join("config.toml")
    }

    /// Render this configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoxrelayError::ConfigParse {
            message: format!("failed to serialize configuration: {}", e),
        })
    }

    /// Write the default configuration to `path`, creating parent
    /// directories. Refuses to overwrite an existing file.
    pub fn write_template(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(VoxrelayError::ConfigInvalidValue {
                key: "path".to_string(),
                message: format!("{} already exists", path.display()),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::default().to_toml()?)?;
        Ok(())
    }
}
