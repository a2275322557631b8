//! voxrelay - Voice command relay for remote actuators
//!
//! Captures microphone audio, streams it to a speech-recognition backend,
//! extracts deduplicated command tokens, and relays them over a persistent
//! websocket connection.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod recognition;
pub mod relay;
pub mod retry;
pub mod status;
pub mod vocab;
pub mod voice;

// Composition root - needs the CLI surface
#[cfg(feature = "cli")]
pub mod app;

// Core seams (source → recognize → relay)
pub use audio::recorder::AudioSource;
pub use recognition::backend::{SpeechBackend, TranscriptionEvent};
pub use relay::link::{CommandLink, LinkConnector};

// Voice mode
pub use voice::{VoiceMode, VoiceModeHandle, VoiceSettings};

// Error handling
pub use error::{Result, VoxrelayError};

// Config
pub use config::Config;

// Status boundary and command vocabulary
pub use status::{StatusUpdate, status_channel};
pub use vocab::{COMMAND_TABLE, Direction};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
