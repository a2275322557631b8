use anyhow::Result;
use clap::{CommandFactory, Parser};
use voxrelay::app::{handle_config_command, list_audio_devices, run_send_command, run_voice_command};
use voxrelay::cli::{Cli, Commands};
use voxrelay::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    match cli.command.take() {
        None => {
            let config = load_config(&cli)?;
            let wav = cli.wav.take();
            run_voice_command(config, wav, cli.quiet, cli.verbose).await?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Send { direction }) => {
            let config = load_config(&cli)?;
            run_send_command(config, direction, cli.quiet).await?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxrelay",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration and apply CLI overrides.
///
/// Priority order:
/// 1. CLI flags (--device, --language, --relay-url, ...)
/// 2. Environment variables (VOXRELAY_*)
/// 3. Config file (--config or ~/.config/voxrelay/config.toml)
/// 4. Built-in defaults
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    }
    .with_env_overrides();

    if let Some(ref device) = cli.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(ref language) = cli.language {
        config.recognition.language = language.clone();
    }
    if let Some(ref url) = cli.recognizer_url {
        config.recognition.url = url.clone();
    }
    if let Some(ref url) = cli.relay_url {
        config.relay.url = url.clone();
    }
    if let Some(timeout_ms) = cli.ack_timeout {
        config.relay.ack_timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}
