//! Session commands, internal events and published updates

use serde_json::Value;

use super::state::SessionView;
use crate::conversation::ConversationError;
use crate::speech::{PlaybackId, PlaybackOutcome};

/// User intent delivered to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start a triage from the welcome screen
    StartTriage,
    /// Start or stop speech capture
    ToggleRecording,
    /// End the session from a concluded conversation
    Finalize,
    /// Unlock the controls when speech or processing is stuck
    EmergencyReset,
    /// Abandon the session
    ReturnToWelcome,
    /// Stop the session loop
    Shutdown,
}

/// Which exchange a backend reply belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// The greeting requested when the session starts
    Opening,
    /// A patient utterance
    Utterance,
}

/// Completion of background work, tagged with the id it was started under
#[derive(Debug)]
pub enum SessionEvent {
    Exchange {
        id: u64,
        kind: ExchangeKind,
        result: Result<Value, ConversationError>,
    },
    PlaybackFinished {
        id: PlaybackId,
        outcome: PlaybackOutcome,
    },
    CountdownTick {
        id: u64,
        remaining: u32,
    },
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Transient notice for the kiosk (toast)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    /// An error notice
    #[must_use]
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Error,
        }
    }
}

/// Published to subscribers whenever the session changes
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Changed(Box<SessionView>),
    Notify(Notification),
}
