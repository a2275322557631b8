//! Error types for voxrelay.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxrelayError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio input device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Recognition stream errors
    #[error("Recognition stream authentication failed: {message}")]
    StreamAuth { message: String },

    #[error("Recognition stream error: {message}")]
    StreamTransient { message: String },

    #[error("Recognition backend quota exceeded: {message}")]
    BackendQuota { message: String },

    // Command relay errors
    #[error("Command relay connection lost: {message}")]
    DispatchConnectionLost { message: String },

    // Vocabulary errors
    #[error("Unknown direction token: {word}")]
    UnknownDirection { word: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxrelayError {
    /// Whether this error terminates voice mode rather than being retried
    /// inside the component that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoxrelayError::DeviceUnavailable { .. } | VoxrelayError::StreamAuth { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxrelayError>;
