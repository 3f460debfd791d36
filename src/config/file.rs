//! TOML configuration file loading
//!
//! Supports `~/.config/live-audio/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Audio pipeline configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Live session configuration
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Rate outbound audio is resampled to (Hz)
    pub capture_sample_rate: Option<u32>,

    /// Rate inbound audio is played at (Hz)
    pub playback_sample_rate: Option<u32>,

    /// Samples per outbound block
    pub block_size: Option<usize>,

    /// Channels of inbound audio
    pub output_channels: Option<u16>,

    /// Cap on queued or playing sources
    pub max_active_sources: Option<usize>,

    /// Outbound blocks buffered between the audio thread and the session
    pub send_queue_depth: Option<usize>,

    /// Session events buffered before the playback consumer
    pub event_queue_depth: Option<usize>,
}

/// Live session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// WebSocket endpoint
    pub endpoint: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Prebuilt voice name
    pub voice: Option<String>,

    /// API key (prefer the environment)
    pub api_key: Option<String>,
}

/// Parse a config file body
///
/// # Errors
///
/// Returns error if the TOML is invalid
pub fn parse_config_file(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/live-audio/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("live-audio").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let file = parse_config_file("").unwrap();
        assert!(file.audio.block_size.is_none());
        assert!(file.session.model.is_none());
    }

    #[test]
    fn partial_sections_parse() {
        let file = parse_config_file(
            r#"
            [audio]
            block_size = 1024
            playback_sample_rate = 48000

            [session]
            voice = "Puck"
            "#,
        )
        .unwrap();

        assert_eq!(file.audio.block_size, Some(1024));
        assert_eq!(file.audio.playback_sample_rate, Some(48000));
        assert_eq!(file.audio.capture_sample_rate, None);
        assert_eq!(file.session.voice.as_deref(), Some("Puck"));
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_config_file("[audio]\nblock_size = \"big\"").is_err());
    }
}
