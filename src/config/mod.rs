//! Configuration management for the triage desk
//!
//! Sources, lowest priority first: built-in defaults, the TOML config file,
//! environment variables, command-line overrides.

pub mod file;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::conversation::DEFAULT_TIMEOUT;
use crate::locale::Locale;
use crate::session::{DEFAULT_COUNTDOWN_SECS, DEFAULT_START_UTTERANCE, SessionSettings};
use crate::speech::{DEFAULT_MODEL, DEFAULT_RATE, DEFAULT_SILENCE_TIMEOUT, DEFAULT_VOICE_ID};
use crate::{Error, Result};

/// Default triage webhook (local n8n instance)
pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/TriagemHospitalXYZ";

/// Default audio player command
pub const DEFAULT_PLAYER: &str = "mpg123 -q -";

/// Default local synthesizer
pub const DEFAULT_SYNTHESIZER: &str = "espeak-ng";

/// Triage desk configuration
#[derive(Debug)]
pub struct Config {
    /// Patient-facing language
    pub locale: Locale,

    /// Conversation backend
    pub backend: BackendConfig,

    /// Speech input and output
    pub speech: SpeechConfig,

    /// Session behaviour
    pub session: SessionConfig,
}

/// Conversation backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Triage webhook URL
    pub webhook_url: Url,

    /// Request timeout
    pub timeout: Duration,
}

/// Remote TTS provider
#[derive(Debug)]
pub enum TtsProvider {
    /// Proxy endpoint taking `{text}`
    Proxy(Url),

    /// ElevenLabs API
    ElevenLabs {
        api_key: SecretString,
        voice_id: String,
        model: String,
    },

    /// No remote TTS; local synthesis only
    Disabled,
}

impl TtsProvider {
    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Proxy(_) => "proxy",
            Self::ElevenLabs { .. } => "elevenlabs",
            Self::Disabled => "none",
        }
    }
}

/// Speech configuration
#[derive(Debug)]
pub struct SpeechConfig {
    /// Remote TTS provider
    pub tts: TtsProvider,

    /// Remote TTS request timeout
    pub tts_timeout: Duration,

    /// Audio player command line
    pub player: String,

    /// Local synthesizer program, if the fallback is enabled
    pub synthesizer: Option<String>,

    /// Local synthesis rate multiplier
    pub rate: f32,

    /// Silence before capture stops by itself
    pub silence_timeout: Duration,

    /// Speak nothing
    pub muted: bool,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Seconds before returning to the welcome screen
    pub countdown_secs: u32,

    /// Utterance that opens a conversation
    pub start_utterance: String,
}

/// Command-line overrides, applied over every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Alternate config file
    pub config_path: Option<PathBuf>,

    /// Patient-facing language
    pub locale: Option<Locale>,

    /// Triage webhook URL
    pub webhook_url: Option<Url>,

    /// TTS proxy endpoint
    pub tts_url: Option<Url>,

    /// Disable speech output
    pub muted: bool,
}

impl Config {
    /// Load configuration from the default sources
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(&ConfigOverrides::default())
    }

    /// Load configuration with command-line overrides
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load_with_options(overrides: &ConfigOverrides) -> Result<Self> {
        let fc = file::load_config_file(overrides.config_path.as_deref());
        Self::resolve(fc, |key| std::env::var(key).ok(), overrides)
    }

    /// Merge file values, environment lookups and overrides
    fn resolve(
        fc: file::TriageConfigFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        // Locale (cli > env > toml > default)
        let locale = match overrides.locale {
            Some(locale) => locale,
            None => env("TRIAGE_LOCALE")
                .or(fc.locale)
                .map(|s| s.parse::<Locale>().map_err(Error::Config))
                .transpose()?
                .unwrap_or_default(),
        };

        // Backend (cli > env > toml > default)
        let webhook_url = match &overrides.webhook_url {
            Some(url) => url.clone(),
            None => parse_url(
                "webhook URL",
                &env("TRIAGE_WEBHOOK_URL")
                    .or(fc.backend.webhook_url)
                    .unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string()),
            )?,
        };
        let backend = BackendConfig {
            webhook_url,
            timeout: env("TRIAGE_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.backend.timeout_secs)
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        };

        // Speech
        let speech_file = fc.speech;
        let tts_url = match &overrides.tts_url {
            Some(url) => Some(url.clone()),
            None => env("TRIAGE_TTS_URL")
                .or(speech_file.tts_url)
                .map(|s| parse_url("TTS URL", &s))
                .transpose()?,
        };
        let api_key = env("ELEVENLABS_API_KEY")
            .or(speech_file.elevenlabs_api_key)
            .filter(|k| !k.is_empty());
        let provider = env("TRIAGE_TTS_PROVIDER").or(speech_file.tts_provider);

        let tts = resolve_tts(
            provider.as_deref(),
            tts_url,
            api_key,
            &env("TRIAGE_VOICE_ID")
                .or(speech_file.voice_id)
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            &env("TRIAGE_TTS_MODEL")
                .or(speech_file.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        )?;

        let synthesizer = env("TRIAGE_SYNTHESIZER")
            .or(speech_file.synthesizer)
            .unwrap_or_else(|| DEFAULT_SYNTHESIZER.to_string());

        let speech = SpeechConfig {
            tts,
            tts_timeout: env("TRIAGE_TTS_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(speech_file.tts_timeout_secs)
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            player: env("TRIAGE_PLAYER")
                .or(speech_file.player)
                .unwrap_or_else(|| DEFAULT_PLAYER.to_string()),
            synthesizer: Some(synthesizer).filter(|s| !s.trim().is_empty()),
            rate: env("TRIAGE_SPEECH_RATE")
                .and_then(|s| s.parse().ok())
                .or(speech_file.rate)
                .unwrap_or(DEFAULT_RATE),
            silence_timeout: env("TRIAGE_SILENCE_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(speech_file.silence_timeout_secs)
                .map_or(DEFAULT_SILENCE_TIMEOUT, Duration::from_secs),
            muted: overrides.muted
                || env("TRIAGE_MUTE")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .or(speech_file.muted)
                    .unwrap_or(false),
        };

        let session = SessionConfig {
            countdown_secs: env("TRIAGE_COUNTDOWN_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.session.countdown_secs)
                .unwrap_or(DEFAULT_COUNTDOWN_SECS),
            start_utterance: env("TRIAGE_START_UTTERANCE")
                .or(fc.session.start_utterance)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_START_UTTERANCE.to_string()),
        };

        Ok(Self {
            locale,
            backend,
            speech,
            session,
        })
    }

    /// Settings for a [`TriageSession`](crate::session::TriageSession)
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            locale: self.locale,
            start_utterance: self.session.start_utterance.clone(),
            countdown_secs: self.session.countdown_secs,
            tick: Duration::from_secs(1),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "locale = {}", self.locale)?;
        writeln!(f, "backend.webhook_url = {}", self.backend.webhook_url)?;
        writeln!(f, "backend.timeout_secs = {}", self.backend.timeout.as_secs())?;
        writeln!(f, "speech.tts_provider = {}", self.speech.tts.name())?;
        match &self.speech.tts {
            TtsProvider::Proxy(url) => writeln!(f, "speech.tts_url = {url}")?,
            TtsProvider::ElevenLabs {
                voice_id, model, ..
            } => {
                writeln!(f, "speech.elevenlabs_api_key = [redacted]")?;
                writeln!(f, "speech.voice_id = {voice_id}")?;
                writeln!(f, "speech.model = {model}")?;
            }
            TtsProvider::Disabled => {}
        }
        writeln!(f, "speech.player = {}", self.speech.player)?;
        writeln!(
            f,
            "speech.synthesizer = {}",
            self.speech.synthesizer.as_deref().unwrap_or("none")
        )?;
        writeln!(f, "speech.rate = {}", self.speech.rate)?;
        writeln!(
            f,
            "speech.silence_timeout_secs = {}",
            self.speech.silence_timeout.as_secs()
        )?;
        writeln!(f, "speech.muted = {}", self.speech.muted)?;
        writeln!(f, "session.countdown_secs = {}", self.session.countdown_secs)?;
        write!(f, "session.start_utterance = {}", self.session.start_utterance)
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Config(format!("invalid {name} '{value}': {e}")))
}

/// Pick the TTS provider: explicit choice, else ElevenLabs with a key, else a proxy URL
fn resolve_tts(
    provider: Option<&str>,
    tts_url: Option<Url>,
    api_key: Option<String>,
    voice_id: &str,
    model: &str,
) -> Result<TtsProvider> {
    let elevenlabs = |api_key: String| TtsProvider::ElevenLabs {
        api_key: SecretString::from(api_key),
        voice_id: voice_id.to_string(),
        model: model.to_string(),
    };

    match provider.map(|p| p.trim().to_lowercase()).as_deref() {
        Some("proxy") => tts_url
            .map(TtsProvider::Proxy)
            .ok_or_else(|| Error::Config("TTS proxy selected but no TTS URL set".to_string())),
        Some("elevenlabs") => api_key.map(elevenlabs).ok_or_else(|| {
            Error::Config("ElevenLabs selected but ELEVENLABS_API_KEY is not set".to_string())
        }),
        Some("none" | "local") => Ok(TtsProvider::Disabled),
        Some(other) => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        None => Ok(match (api_key, tts_url) {
            (Some(key), _) => elevenlabs(key),
            (None, Some(url)) => TtsProvider::Proxy(url),
            (None, None) => TtsProvider::Disabled,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(vars: &[(&str, &str)], overrides: &ConfigOverrides) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(
            file::TriageConfigFile::default(),
            |key| vars.get(key).cloned(),
            overrides,
        )
    }

    #[test]
    fn defaults() {
        let config = resolve(&[], &ConfigOverrides::default()).unwrap();
        assert_eq!(config.locale, Locale::PtBr);
        assert_eq!(config.backend.webhook_url.as_str(), DEFAULT_WEBHOOK_URL);
        assert_eq!(config.backend.timeout, Duration::from_secs(30));
        assert!(matches!(config.speech.tts, TtsProvider::Disabled));
        assert_eq!(config.speech.synthesizer.as_deref(), Some("espeak-ng"));
        assert_eq!(config.session.countdown_secs, 30);
        assert_eq!(config.session.start_utterance, "iniciar");
        assert!(!config.speech.muted);
    }

    #[test]
    fn env_overrides_file() {
        let fc: file::TriageConfigFile = toml::from_str(
            "[backend]\nwebhook_url = \"http://file.local/hook\"\ntimeout_secs = 5\n",
        )
        .unwrap();
        let config = Config::resolve(
            fc,
            |key| (key == "TRIAGE_WEBHOOK_URL").then(|| "http://env.local/hook".to_string()),
            &ConfigOverrides::default(),
        )
        .unwrap();

        assert_eq!(config.backend.webhook_url.as_str(), "http://env.local/hook");
        assert_eq!(config.backend.timeout, Duration::from_secs(5));
    }

    #[test]
    fn cli_overrides_env() {
        let overrides = ConfigOverrides {
            webhook_url: Some(Url::parse("http://cli.local/hook").unwrap()),
            locale: Some(Locale::En),
            muted: true,
            ..ConfigOverrides::default()
        };
        let config = resolve(
            &[
                ("TRIAGE_WEBHOOK_URL", "http://env.local/hook"),
                ("TRIAGE_LOCALE", "pt-BR"),
            ],
            &overrides,
        )
        .unwrap();

        assert_eq!(config.backend.webhook_url.as_str(), "http://cli.local/hook");
        assert_eq!(config.locale, Locale::En);
        assert!(config.speech.muted);
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = resolve(&[("TRIAGE_WEBHOOK_URL", "not a url")], &ConfigOverrides::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn invalid_locale_is_rejected() {
        let result = resolve(&[("TRIAGE_LOCALE", "klingon")], &ConfigOverrides::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn elevenlabs_key_selects_elevenlabs() {
        let config = resolve(
            &[
                ("ELEVENLABS_API_KEY", "secret"),
                ("TRIAGE_TTS_URL", "http://localhost:3000/api/text-to-speech"),
            ],
            &ConfigOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.speech.tts.name(), "elevenlabs");
        assert!(!config.to_string().contains("secret"));
    }

    #[test]
    fn tts_url_selects_proxy() {
        let config = resolve(
            &[("TRIAGE_TTS_URL", "http://localhost:3000/api/text-to-speech")],
            &ConfigOverrides::default(),
        )
        .unwrap();
        assert!(matches!(config.speech.tts, TtsProvider::Proxy(_)));
    }

    #[test]
    fn explicit_provider_requires_its_settings() {
        let result = resolve(&[("TRIAGE_TTS_PROVIDER", "proxy")], &ConfigOverrides::default());
        assert!(result.is_err());

        let result = resolve(&[("TRIAGE_TTS_PROVIDER", "elevenlabs")], &ConfigOverrides::default());
        assert!(result.is_err());

        let config = resolve(
            &[("TRIAGE_TTS_PROVIDER", "none"), ("ELEVENLABS_API_KEY", "k")],
            &ConfigOverrides::default(),
        )
        .unwrap();
        assert!(matches!(config.speech.tts, TtsProvider::Disabled));
    }

    #[test]
    fn empty_synthesizer_disables_fallback() {
        let config = resolve(&[("TRIAGE_SYNTHESIZER", "")], &ConfigOverrides::default()).unwrap();
        assert_eq!(config.speech.synthesizer, None);
    }

    #[test]
    fn session_settings_follow_config() {
        let config = resolve(
            &[("TRIAGE_COUNTDOWN_SECS", "10"), ("TRIAGE_START_UTTERANCE", "start")],
            &ConfigOverrides::default(),
        )
        .unwrap();
        let settings = config.session_settings();
        assert_eq!(settings.countdown_secs, 10);
        assert_eq!(settings.start_utterance, "start");
    }
}
