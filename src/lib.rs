//! Triage Desk - Voice-driven virtual triage for hospital front desks
//!
//! This library provides the core functionality for a triage kiosk:
//! - Speech capture with inactivity auto-stop
//! - Conversation with a remote triage workflow (webhook)
//! - Reply normalization and status classification
//! - Spoken replies via remote TTS with a local synthesis fallback
//! - Session orchestration with an automatic return to the welcome screen
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Kiosk front-end                      │
//! │         Console  │  SessionView  │  Commands         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Triage session                       │
//! │   Capture  │  Countdown  │  Speech output            │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          Conversation backend (webhook)              │
//! │      { message, sessionId } → reply + status         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod console;
pub mod conversation;
pub mod error;
pub mod kiosk;
pub mod locale;
pub mod session;
pub mod speech;

pub use config::Config;
pub use conversation::{
    ConversationClient, ConversationError, ConversationStatus, StructuredResponse, WebhookClient,
    parse_response,
};
pub use error::{Error, Result};
pub use kiosk::Kiosk;
pub use locale::Locale;
pub use session::{SessionCommand, SessionUpdate, SessionView, TriageSession};
pub use speech::{SpeechCapture, SpeechOutput};
