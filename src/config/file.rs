//! TOML configuration file loading
//!
//! Supports `~/.config/triage-desk/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TriageConfigFile {
    /// Patient-facing language (e.g. "pt-BR")
    #[serde(default)]
    pub locale: Option<String>,

    /// Conversation backend
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Speech input and output
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Session behaviour
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Conversation backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Triage webhook URL
    pub webhook_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// "proxy", "elevenlabs" or "none"
    pub tts_provider: Option<String>,

    /// TTS proxy endpoint
    pub tts_url: Option<String>,

    /// ElevenLabs API key
    pub elevenlabs_api_key: Option<String>,

    /// ElevenLabs voice id
    pub voice_id: Option<String>,

    /// ElevenLabs model id
    pub model: Option<String>,

    /// TTS request timeout in seconds
    pub tts_timeout_secs: Option<u64>,

    /// Audio player command line (reads MP3 on stdin)
    pub player: Option<String>,

    /// Local synthesizer program; empty disables the fallback
    pub synthesizer: Option<String>,

    /// Local synthesis rate multiplier
    pub rate: Option<f32>,

    /// Seconds of silence before capture stops
    pub silence_timeout_secs: Option<u64>,

    /// Disable speech output
    pub muted: Option<bool>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Seconds before returning to the welcome screen
    pub countdown_secs: Option<u32>,

    /// Utterance that opens a conversation
    pub start_utterance: Option<String>,
}

/// Load the TOML config file from `path`, or from the standard path
///
/// Returns `TriageConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file(path: Option<&Path>) -> TriageConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return TriageConfigFile::default();
    };

    if !path.exists() {
        return TriageConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
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
                TriageConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            TriageConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/triage-desk/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("triage-desk").join("config.toml"))
}
