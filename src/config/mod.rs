//! Configuration management
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! `LIVE_AUDIO_*` environment variables. Everything here is fixed at
//! construction time.

pub mod file;

use crate::playback::DEFAULT_MAX_ACTIVE_SOURCES;
use crate::{Error, Result};

use file::ConfigFile;

/// Default Live API WebSocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio dialog model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-native-audio-dialog";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Orus";

/// Full configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Audio pipeline configuration
    pub audio: AudioConfig,

    /// Live session configuration
    pub session: SessionConfig,
}

/// Audio pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Rate outbound audio is resampled to (Hz)
    pub capture_sample_rate: u32,

    /// Rate inbound audio is played at (Hz)
    pub playback_sample_rate: u32,

    /// Samples per outbound block; smaller means lower latency and more
    /// per-message overhead
    pub block_size: usize,

    /// Channels of inbound audio
    pub output_channels: u16,

    /// Cap on queued or playing sources
    pub max_active_sources: usize,

    /// Outbound blocks buffered between the audio thread and the session
    pub send_queue_depth: usize,

    /// Session events buffered before the playback consumer
    pub event_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            block_size: 256,
            output_channels: 1,
            max_active_sources: DEFAULT_MAX_ACTIVE_SOURCES,
            send_queue_depth: 64,
            event_queue_depth: 64,
        }
    }
}

impl AudioConfig {
    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.capture_sample_rate == 0 {
            return Err(Error::Config("capture_sample_rate must be non-zero".to_string()));
        }
        if self.playback_sample_rate == 0 {
            return Err(Error::Config("playback_sample_rate must be non-zero".to_string()));
        }
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be non-zero".to_string()));
        }
        if !(1..=2).contains(&self.output_channels) {
            return Err(Error::Config(format!(
                "output_channels must be 1 or 2, got {}",
                self.output_channels
            )));
        }
        if self.max_active_sources == 0 || self.send_queue_depth == 0 || self.event_queue_depth == 0 {
            return Err(Error::Config("queue bounds must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Live session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// WebSocket endpoint
    pub endpoint: String,

    /// Model identifier, with or without the `models/` prefix
    pub model: String,

    /// Prebuilt voice name
    pub voice: String,

    /// API key, from `GEMINI_API_KEY` or the config file
    pub api_key: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a variable does not parse or the result is invalid
    pub fn from_sources(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(file);
        config.apply_env(env)?;
        config.audio.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        let audio = &mut self.audio;
        let f = file.audio;
        audio.capture_sample_rate = f.capture_sample_rate.unwrap_or(audio.capture_sample_rate);
        audio.playback_sample_rate = f.playback_sample_rate.unwrap_or(audio.playback_sample_rate);
        audio.block_size = f.block_size.unwrap_or(audio.block_size);
        audio.output_channels = f.output_channels.unwrap_or(audio.output_channels);
        audio.max_active_sources = f.max_active_sources.unwrap_or(audio.max_active_sources);
        audio.send_queue_depth = f.send_queue_depth.unwrap_or(audio.send_queue_depth);
        audio.event_queue_depth = f.event_queue_depth.unwrap_or(audio.event_queue_depth);

        let session = &mut self.session;
        let f = file.session;
        if let Some(endpoint) = f.endpoint {
            session.endpoint = endpoint;
        }
        if let Some(model) = f.model {
            session.model = model;
        }
        if let Some(voice) = f.voice {
            session.voice = voice;
        }
        if f.api_key.is_some() {
            session.api_key = f.api_key;
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_env(&env, "LIVE_AUDIO_CAPTURE_RATE")? {
            self.audio.capture_sample_rate = v;
        }
        if let Some(v) = parse_env(&env, "LIVE_AUDIO_PLAYBACK_RATE")? {
            self.audio.playback_sample_rate = v;
        }
        if let Some(v) = parse_env(&env, "LIVE_AUDIO_BLOCK_SIZE")? {
            self.audio.block_size = v;
        }
        if let Some(v) = parse_env(&env, "LIVE_AUDIO_MAX_ACTIVE_SOURCES")? {
            self.audio.max_active_sources = v;
        }

        if let Some(endpoint) = env("LIVE_AUDIO_ENDPOINT") {
            self.session.endpoint = endpoint;
        }
        if let Some(model) = env("LIVE_AUDIO_MODEL") {
            self.session.model = model;
        }
        if let Some(voice) = env("LIVE_AUDIO_VOICE") {
            self.session.voice = voice;
        }
        if let Some(key) = env("GEMINI_API_KEY").or_else(|| env("API_KEY")) {
            self.session.api_key = Some(key);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} has invalid value {raw:?}")))
        })
        .transpose()
}
