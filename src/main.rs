//! Voxline CLI binary entry point.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use voxline::audio::device::{CpalInput, CpalOutput};
use voxline::audio::{PlaybackScheduler, SpeechClip};
use voxline::cli::{Cli, Commands, PlayArgs, TalkArgs};
use voxline::config::VoxConfig;
use voxline::realtime::WebSocketTransport;
use voxline::session::{SessionController, SessionState, SessionUpdate};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let layer = match load_layer(cli.config.as_deref()) {
        Ok(layer) => layer,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Talk(args) => handle_talk(layer, args).await,
        Commands::Play(args) => handle_play(args).await,
        Commands::Config => handle_config(layer),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_layer(path: Option<&Path>) -> voxline::Result<VoxConfig> {
    match path {
        Some(path) => Ok(VoxConfig::from_file(path)?.merge(VoxConfig::from_env())),
        None => VoxConfig::load(),
    }
}

async fn handle_talk(layer: VoxConfig, args: TalkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = layer.merge(args.as_layer()).into_session_config()?;
    let input = Arc::new(CpalInput::new(config.input_sample_rate));
    let output = CpalOutput::open()?;
    let mut session =
        SessionController::new(config, input, output, Arc::new(WebSocketTransport::new()));

    session.start().await?;
    eprintln!("Live. Press Ctrl-C to hang up.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.stop().await?;
                break;
            }
            update = session.next_update() => {
                let Some(update) = update else { break };
                match update {
                    SessionUpdate::StateChanged(state) => {
                        tracing::info!(%state, "session state");
                        if state == SessionState::Idle {
                            break;
                        }
                    }
                    SessionUpdate::Interrupted { stopped } => {
                        tracing::info!(stopped, "agent interrupted");
                    }
                    SessionUpdate::AudioScheduled(handle) => {
                        tracing::trace!(start_ms = handle.start().as_millis() as u64, "agent audio queued");
                    }
                    SessionUpdate::ChunkDropped(error) => {
                        tracing::warn!(%error, "dropped agent audio");
                    }
                    SessionUpdate::Failed(error) => {
                        eprintln!("Session ended: {error} ({:?})", error.recovery_suggestion());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_play(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(&args.file).await?;
    let clip = SpeechClip::from_pcm_bytes(bytes, args.rate, args.channels)?;
    let mut scheduler = PlaybackScheduler::new(CpalOutput::open()?);
    let handle = scheduler.schedule(&clip.decode()?)?;

    eprintln!(
        "Playing {} ({:.2}s)",
        args.file.display(),
        clip.duration().as_secs_f64()
    );
    tokio::time::sleep(handle.duration()).await;
    Ok(())
}

fn handle_config(layer: VoxConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", toml::to_string_pretty(&layer.redacted())?);
    Ok(())
}
