//! CLI surface for voxline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::audio::types::DEFAULT_OUTPUT_SAMPLE_RATE;
use crate::config::VoxConfig;

/// Voxline voice client
#[derive(Parser, Debug)]
#[command(name = "voxline", version, about = "Voxline — realtime voice sessions")]
pub struct Cli {
    /// Config file to read instead of ~/.voxline/config.toml
    #[arg(long, global = true, env = "VOXLINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a live voice session with the remote agent
    Talk(TalkArgs),
    /// Play a raw PCM16 file through the speaker
    Play(PlayArgs),
    /// Print the resolved configuration
    Config,
}

/// Arguments for `voxline talk`.
#[derive(Parser, Debug, Default)]
pub struct TalkArgs {
    /// Session endpoint (ws:// or wss://)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Agent model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Prebuilt voice name
    #[arg(short, long)]
    pub voice: Option<String>,

    /// System instructions for the agent
    #[arg(short, long)]
    pub instructions: Option<String>,
}

impl TalkArgs {
    /// Flags as the topmost configuration layer.
    pub fn as_layer(&self) -> VoxConfig {
        VoxConfig {
            url: self.url.clone(),
            model: self.model.clone(),
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
            ..Default::default()
        }
    }
}

/// Arguments for `voxline play`.
#[derive(Parser, Debug)]
pub struct PlayArgs {
    /// Raw little-endian PCM16 file
    pub file: PathBuf,

    /// Sample rate of the file
    #[arg(short, long, default_value_t = DEFAULT_OUTPUT_SAMPLE_RATE)]
    pub rate: u32,

    /// Interleaved channel count
    #[arg(short, long, default_value_t = 1)]
    pub channels: u16,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
