//! Command-line interface for voxrelay
//!
//! Provides argument parsing using clap derive macros.

use crate::vocab::Direction;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Voice command relay for remote actuators
#[derive(Parser, Debug)]
#[command(
    name = "voxrelay",
    version = crate::version_string(),
    about = "Voice command relay for remote actuators"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: recognized/sent lines, -vv: stream diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Replay a WAV file instead of capturing from the microphone
    #[arg(long, value_name = "FILE")]
    pub wav: Option<PathBuf>,

    /// Language hint for the recognition backend (default: ko-KR)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Recognition backend endpoint (ws:// or wss://)
    #[arg(long, value_name = "URL")]
    pub recognizer_url: Option<String>,

    /// Command relay endpoint (the remote actuator)
    #[arg(long, value_name = "URL")]
    pub relay_url: Option<String>,

    /// Per-command acknowledgment timeout (default: 5s). Examples: 500ms, 2s, 1m
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout_ms)]
    pub ack_timeout: Option<u64>,
}

/// Parse a timeout string into milliseconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (milliseconds), single-unit (`500ms`, `2s`), and compound (`1m30s`).
fn parse_timeout_ms(s: &str) -> Result<u64, String> {
    let s = s.trim();
    // Bare number → milliseconds
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(ms);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Send one command to the actuator and print the acknowledgment
    Send {
        /// Logical direction: up, down, left, right, reset, start, stop
        direction: Direction,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init,
}
