//! Error types for the triage desk

use thiserror::Error;

use crate::conversation::ConversationError;

/// Result type alias for triage desk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the triage desk
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech capture error (recognizer unavailable or rejected)
    #[error("capture error: {0}")]
    Capture(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Local speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Conversation backend error
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
