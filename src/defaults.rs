//! Default configuration constants for voxrelay.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Nominal audio frame duration in milliseconds.
///
/// 100ms frames (1600 samples at 16kHz) keep recognition latency low while
/// leaving the websocket send path with comfortably few messages per second.
pub const FRAME_MS: u32 = 100;

/// Default language hint for the recognition backend.
pub const LANGUAGE: &str = "ko-KR";

/// Default recognition backend endpoint.
///
/// The recognizer is an opaque websocket service; point this at whatever
/// speaks the streaming protocol (binary PCM in, JSON results out).
pub const RECOGNIZER_URL: &str = "ws://127.0.0.1:8790";

/// Default command relay endpoint (the remote actuator).
pub const RELAY_URL: &str = "ws://192.168.137.205:7890";

/// Recognition stream lifetime in seconds.
///
/// Streaming backends bound session length; the client transparently
/// reopens the stream when this many seconds of audio have been forwarded.
pub const STREAM_LIFETIME_SECS: u64 = 60;

/// Maximum consecutive recognition stream open failures before giving up.
pub const MAX_STREAM_RETRIES: u32 = 5;

/// Per-command acknowledgment timeout in milliseconds.
///
/// The actuator answers every command with one text frame; a missing answer
/// within this window is treated as a lost connection.
pub const ACK_TIMEOUT_MS: u64 = 5000;

/// Maximum consecutive dispatch connection failures before giving up.
pub const MAX_DISPATCH_FAILURES: u32 = 5;

/// Base delay for exponential reconnect backoff in milliseconds.
pub const RECONNECT_BASE_MS: u64 = 800;

/// Ceiling for exponential reconnect backoff in milliseconds.
pub const RECONNECT_MAX_MS: u64 = 30_000;

/// Dispatcher idle poll interval in milliseconds.
///
/// How often the dispatcher checks the pending batch slot while connected
/// and idle. Short enough to feel immediate, long enough to stay off the CPU.
pub const IDLE_POLL_MS: u64 = 50;

/// Capture-to-recognition frame channel capacity.
///
/// ~6 seconds of audio at the default frame length. When full, the newest
/// frame is dropped (documented degraded mode, never silent corruption).
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Status notification channel capacity.
///
/// Only the latest value matters to the display; overflow drops.
pub const STATUS_CHANNEL_CAPACITY: usize = 32;

/// Number of samples in one nominal frame at the given rate and length.
pub fn frame_samples(sample_rate: u32, frame_ms: u32) -> usize {
    (sample_rate as usize * frame_ms as usize) / 1000
}

/// Number of frames a recognition stream may carry before it is reopened.
pub fn frames_per_stream(lifetime_secs: u64, frame_ms: u32) -> u64 {
    (lifetime_secs * 1000) / frame_ms.max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_samples_at_defaults() {
        assert_eq!(frame_samples(SAMPLE_RATE, FRAME_MS), 1600);
    }

    #[test]
    fn frames_per_stream_at_defaults() {
        // 60 seconds of 100ms frames
        assert_eq!(frames_per_stream(STREAM_LIFETIME_SECS, FRAME_MS), 600);
    }

    #[test]
    fn frames_per_stream_guards_zero_frame_ms() {
        assert_eq!(frames_per_stream(60, 0), 60_000);
    }
}
