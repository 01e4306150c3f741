//! Triage session
//!
//! The orchestrator ties capture, the conversation backend and speech output
//! into one session with a single owner. Kiosk front-ends send
//! [`SessionCommand`]s and render the [`SessionView`]s it publishes.

mod countdown;
mod events;
mod orchestrator;
mod state;

pub use countdown::{Countdown, DEFAULT_COUNTDOWN_SECS};
pub use events::{
    ExchangeKind, Notification, SessionCommand, SessionEvent, SessionUpdate, Severity,
};
pub use orchestrator::{DEFAULT_START_UTTERANCE, SessionSettings, TriageSession};
pub use state::{
    Controls, Message, RecordBlock, ReturnTimer, Screen, Session, SessionView, VoiceActivity,
    VoiceState,
};
