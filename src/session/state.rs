//! Session state types

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::conversation::ConversationStatus;

/// One triage conversation, from start to return to welcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Start a session with a fresh id
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Correlation id sent with every backend request
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// When the session started
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry in the conversation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: Uuid,
    text: String,
    is_user: bool,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// A patient utterance
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text.into(), true)
    }

    /// An assistant reply or system-authored notice
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text.into(), false)
    }

    fn new(text: String, is_user: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            is_user,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn is_user(&self) -> bool {
        self.is_user
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// What the voice interface is doing; the four activities are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceActivity {
    #[default]
    Idle,
    Recording,
    Processing,
    Speaking,
}

/// Voice interface state shown to the patient
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceState {
    pub activity: VoiceActivity,
    pub error: Option<String>,
}

impl VoiceState {
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.activity == VoiceActivity::Recording
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.activity == VoiceActivity::Processing
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.activity == VoiceActivity::Speaking
    }
}

/// Which screen the kiosk shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Welcome,
    Active,
}

/// Return-to-welcome timer, derived from the conversation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnTimer {
    /// No countdown
    #[default]
    Normal,
    /// Triage concluded or handed to a human
    CountingDown(u32),
    /// Emergency detected; the banner is shown while counting down
    Alerting(u32),
}

impl ReturnTimer {
    /// Seconds left, if counting down
    #[must_use]
    pub const fn remaining(self) -> Option<u32> {
        match self {
            Self::Normal => None,
            Self::CountingDown(n) | Self::Alerting(n) => Some(n),
        }
    }
}

/// Why the record control is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBlock {
    NoSession,
    Unsupported,
    Initializing,
    Processing,
    /// A reply is still outstanding after an emergency reset
    AwaitingReply,
    EmergencyAlert,
    Concluded,
}

/// Availability of the kiosk controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    /// The voice control accepts a toggle
    pub can_record: bool,
    /// Finalize replaces the voice control
    pub show_finalize: bool,
    /// The unlock (emergency reset) link is offered
    pub show_unlock: bool,
    /// Why recording is unavailable, if it is
    pub record_block: Option<RecordBlock>,
}

/// Snapshot of everything the kiosk renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub screen: Screen,
    pub session_id: Option<Uuid>,
    pub initializing: bool,
    pub messages: Vec<Message>,
    pub voice: VoiceState,
    pub transcript: String,
    pub status: ConversationStatus,
    pub timer: ReturnTimer,
    pub emergency_banner: bool,
    pub controls: Controls,
}

impl SessionView {
    /// Seconds until the automatic return to welcome, if counting down
    #[must_use]
    pub const fn countdown(&self) -> Option<u32> {
        self.timer.remaining()
    }

    /// Most recent message, if any
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
