//! Application entry points.
//!
//! Wires configuration and collaborators into voice mode, the manual send
//! path, and the operator-facing subcommands.

use crate::audio::recorder::AudioSource;
use crate::audio::wav::WavAudioSource;
use crate::cli::ConfigAction;
use crate::config::Config;
use crate::error::{Result, VoxrelayError};
use crate::recognition::backend::StreamParams;
use crate::recognition::client::RecognitionSettings;
use crate::recognition::ws::WsSpeechBackend;
use crate::relay::dispatcher::DispatcherSettings;
use crate::relay::link::{CommandLink, LinkConnector};
use crate::relay::ws::WsLinkConnector;
use crate::status::{StatusUpdate, status_channel};
use crate::vocab::Direction;
use crate::voice::{VoiceMode, VoiceSettings};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "cpal-audio")]
use crate::audio::capture::{CpalAudioSource, list_devices};

/// Run voice mode: capture → recognize → relay, until Ctrl+C or a fatal
/// error.
pub async fn run_voice_command(
    config: Config,
    wav: Option<PathBuf>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    let audio_source = make_audio_source(&config, wav.as_deref())?;
    let backend = Arc::new(WsSpeechBackend::new(&config.recognition.url));
    let connector = Arc::new(WsLinkConnector::new(&config.relay.url));

    let (status_tx, status_rx) = status_channel();

    // Status consumer: renders the latest value on its own thread so
    // producers never wait on the terminal.
    let render = std::thread::spawn(move || {
        for update in status_rx.iter() {
            if quiet {
                continue;
            }
            match update {
                StatusUpdate::Recognized(token) => {
                    eprintln!("{} {}", "recognized:".dimmed(), token);
                }
                StatusUpdate::Sent(token) => {
                    eprintln!("{} {}", "sent:".dimmed(), token.green());
                }
            }
        }
    });

    let settings = voice_settings(&config, verbosity);
    if !quiet {
        eprintln!("voxrelay: relaying to {} (Ctrl+C to stop)", config.relay.url);
    }

    let mut handle = VoiceMode::new(settings).start(audio_source, backend, connector, status_tx)?;

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nvoxrelay: shutting down...");
            }
            signal.map_err(|e| VoxrelayError::Other(format!("failed to wait for Ctrl+C: {e}")))
        }
        result = handle.wait() => result,
    };

    handle.stop().await;

    // Once every producer is gone the render thread drains and exits; if a
    // detached context still holds a sender, detach the renderer too rather
    // than hang shutdown on it.
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while !render.is_finished() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    if render.is_finished() && render.join().is_err() {
        eprintln!("voxrelay: status render thread panicked");
    }

    outcome
}

/// Send one manually chosen command and print the acknowledgment.
///
/// Exercises the same link as voice mode: one text frame out, one ack back.
pub async fn run_send_command(config: Config, direction: Direction, quiet: bool) -> Result<()> {
    let word = direction.wire_word();
    let connector = WsLinkConnector::new(&config.relay.url);

    let mut link = connector.connect().await?;
    let result = send_one(
        link.as_mut(),
        word,
        Duration::from_millis(config.relay.ack_timeout_ms),
    )
    .await;
    let _ = link.close().await;
    let ack = result?;

    if !quiet {
        println!("{} -> {}", direction, word);
        println!("ack: {}", ack.green());
    }
    Ok(())
}

async fn send_one(link: &mut dyn CommandLink, word: &str, timeout: Duration) -> Result<String> {
    link.send(word).await?;
    tokio::time::timeout(timeout, link.recv_ack())
        .await
        .map_err(|_| VoxrelayError::DispatchConnectionLost {
            message: format!("acknowledgment for {word} timed out"),
        })?
}

/// List available audio input devices.
pub fn list_audio_devices() -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    {
        let devices = list_devices()?;

        if devices.is_empty() {
            eprintln!("No audio input devices found");
            std::process::exit(1);
        }

        println!("Available audio input devices:");
        for (idx, device) in devices.iter().enumerate() {
            println!("  [{}] {}", idx, device);
        }

        Ok(())
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        Err(VoxrelayError::Other(
            "compiled without microphone support (cpal-audio feature)".to_string(),
        ))
    }
}

/// Handle configuration commands.
pub fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init => {
            Config::write_template(&config_path)?;
            println!("Wrote default configuration to {}", config_path.display());
        }
    }
    Ok(())
}

/// Build the audio source: WAV replay when a file is given, otherwise the
/// microphone.
fn make_audio_source(config: &Config, wav: Option<&Path>) -> Result<Box<dyn AudioSource>> {
    if let Some(path) = wav {
        return Ok(Box::new(WavAudioSource::from_path(path)?));
    }

    #[cfg(feature = "cpal-audio")]
    {
        let device_name = config.audio.device.as_deref();
        Ok(Box::new(CpalAudioSource::new(device_name)?))
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        let _ = config;
        Err(VoxrelayError::DeviceUnavailable {
            device: "compiled without microphone support (cpal-audio feature)".to_string(),
        })
    }
}

/// Translate configuration into voice-mode settings.
fn voice_settings(config: &Config, verbosity: u8) -> VoiceSettings {
    VoiceSettings {
        sample_rate: config.audio.sample_rate,
        frame_ms: config.audio.frame_ms,
        params: StreamParams {
            sample_rate: config.audio.sample_rate,
            language: config.recognition.language.clone(),
            interim_results: config.recognition.interim_results,
        },
        recognition: RecognitionSettings {
            frames_per_stream: crate::defaults::frames_per_stream(
                config.recognition.stream_lifetime_secs,
                config.audio.frame_ms,
            ),
            max_retries: config.recognition.max_retries,
            reconnect_base_ms: config.relay.reconnect_base_ms,
            reconnect_max_ms: config.relay.reconnect_max_ms,
        },
        dispatch: DispatcherSettings {
            ack_timeout: Duration::from_millis(config.relay.ack_timeout_ms),
            max_consecutive_failures: config.relay.max_consecutive_failures,
            reconnect_base_ms: config.relay.reconnect_base_ms,
            reconnect_max_ms: config.relay.reconnect_max_ms,
            idle_poll: Duration::from_millis(crate::defaults::IDLE_POLL_MS),
        },
        verbosity,
    }
}
