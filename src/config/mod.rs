//! Configuration system (layered: defaults < config file < env < code).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::audio::types::{DEFAULT_BLOCK_SIZE, DEFAULT_OUTPUT_SAMPLE_RATE, OUTBOUND_SAMPLE_RATE};
use crate::error::{Result, VoxError};

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8765/v1/live";
pub const DEFAULT_MODEL: &str = "native-audio-dialog";
pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Everything a single session needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct SessionConfig {
    #[builder(into, default = DEFAULT_URL.to_string())]
    pub url: String,
    #[builder(into)]
    pub api_key: Option<String>,
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(into)]
    pub voice: Option<String>,
    #[builder(into)]
    pub instructions: Option<String>,
    /// Capture window, in samples.
    #[builder(default = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,
    /// Rate the microphone is expected to run at.
    #[builder(default = OUTBOUND_SAMPLE_RATE)]
    pub input_sample_rate: u32,
    /// Rate of inbound agent audio.
    #[builder(default = DEFAULT_OUTPUT_SAMPLE_RATE)]
    pub output_sample_rate: u32,
    #[builder(default = 1)]
    pub output_channels: u16,
    #[builder(default = Duration::from_secs(DEFAULT_HEARTBEAT_SECS))]
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionConfig {
    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(VoxError::Configuration("session URL cannot be empty".into()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(VoxError::Configuration(format!(
                "session URL must use ws:// or wss://, got '{url}'"
            )));
        }
        if self.block_size == 0 {
            return Err(VoxError::Configuration("block size must be positive".into()));
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(VoxError::Configuration("sample rates must be positive".into()));
        }
        if self.output_channels == 0 {
            return Err(VoxError::Configuration(
                "output channel count must be positive".into(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(VoxError::Configuration(
                "heartbeat interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Partial settings from one configuration layer.
///
/// Layers are merged with [`VoxConfig::merge`]; later layers win field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub block_size: Option<usize>,
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    pub output_channels: Option<u16>,
    pub heartbeat_secs: Option<u64>,
}

impl VoxConfig {
    /// `~/.voxline/config.toml`.
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".voxline"))
            .unwrap_or_else(|| PathBuf::from(".voxline"))
            .join(CONFIG_FILE_NAME)
    }

    /// Read a TOML layer. A missing file is an empty layer.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(error) => return Err(VoxError::Io(error)),
        };
        toml::from_str(&raw).map_err(|error| {
            VoxError::Configuration(format!("invalid config file {}: {error}", path.display()))
        })
    }

    /// Load from environment variables (`VOXLINE_URL`, `VOXLINE_API_KEY`, ...).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a layer from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            url: text("VOXLINE_URL"),
            api_key: text("VOXLINE_API_KEY"),
            model: text("VOXLINE_MODEL"),
            voice: text("VOXLINE_VOICE"),
            instructions: text("VOXLINE_INSTRUCTIONS"),
            block_size: parse_number(text("VOXLINE_BLOCK_SIZE")),
            input_sample_rate: parse_number(text("VOXLINE_INPUT_SAMPLE_RATE")),
            output_sample_rate: parse_number(text("VOXLINE_OUTPUT_SAMPLE_RATE")),
            output_channels: parse_number(text("VOXLINE_OUTPUT_CHANNELS")),
            heartbeat_secs: parse_number(text("VOXLINE_HEARTBEAT_SECS")),
        }
    }

    /// Default file layer overlaid with the environment.
    pub fn load() -> Result<Self> {
        Ok(Self::from_file(&Self::default_path())?.merge(Self::from_env()))
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(self, other: Self) -> Self {
        Self {
            url: other.url.or(self.url),
            api_key: other.api_key.or(self.api_key),
            model: other.model.or(self.model),
            voice: other.voice.or(self.voice),
            instructions: other.instructions.or(self.instructions),
            block_size: other.block_size.or(self.block_size),
            input_sample_rate: other.input_sample_rate.or(self.input_sample_rate),
            output_sample_rate: other.output_sample_rate.or(self.output_sample_rate),
            output_channels: other.output_channels.or(self.output_channels),
            heartbeat_secs: other.heartbeat_secs.or(self.heartbeat_secs),
        }
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }

    /// Resolve against defaults and validate.
    pub fn into_session_config(self) -> Result<SessionConfig> {
        let defaults = SessionConfig::default();
        let config = SessionConfig {
            url: self.url.unwrap_or(defaults.url),
            api_key: self.api_key,
            model: self.model.unwrap_or(defaults.model),
            voice: self.voice,
            instructions: self.instructions,
            block_size: self.block_size.unwrap_or(defaults.block_size),
            input_sample_rate: self.input_sample_rate.unwrap_or(defaults.input_sample_rate),
            output_sample_rate: self
                .output_sample_rate
                .unwrap_or(defaults.output_sample_rate),
            output_channels: self.output_channels.unwrap_or(defaults.output_channels),
            heartbeat_interval: self
                .heartbeat_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|value| value.trim().parse().ok())
}
