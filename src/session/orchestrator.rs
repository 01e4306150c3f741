//! Triage session orchestrator
//!
//! Owns all session state and is the only place it changes. Backend
//! exchanges, speech playback and the countdown run as background tasks that
//! report back as [`SessionEvent`]s tagged with the id they were started
//! under; replies for anything since cancelled or replaced are dropped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::countdown::{Countdown, DEFAULT_COUNTDOWN_SECS};
use super::events::{ExchangeKind, Notification, SessionCommand, SessionEvent, SessionUpdate};
use super::state::{
    Controls, Message, RecordBlock, ReturnTimer, Screen, Session, SessionView, VoiceActivity,
    VoiceState,
};
use crate::conversation::{
    ConversationClient, ConversationError, ConversationStatus, parse_response,
};
use crate::locale::{Locale, Strings};
use crate::speech::{CaptureUpdate, Playback, PlaybackId, PlaybackOutcome, SpeechCapture, SpeechOutput};

/// Utterance that asks the backend for its greeting
pub const DEFAULT_START_UTTERANCE: &str = "iniciar";

/// Update channel capacity; slow subscribers skip to the latest view
const UPDATE_CAPACITY: usize = 64;

/// Session behaviour settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Language of patient-facing text
    pub locale: Locale,
    /// Sentinel sent to open a conversation; never shown as a message
    pub start_utterance: String,
    /// Countdown length after a terminal status
    pub countdown_secs: u32,
    /// Countdown tick period
    pub tick: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            start_utterance: DEFAULT_START_UTTERANCE.to_string(),
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            tick: Duration::from_secs(1),
        }
    }
}

/// A backend request in flight
struct Exchange {
    id: u64,
    kind: ExchangeKind,
    task: JoinHandle<()>,
}

/// Voice triage session
pub struct TriageSession {
    settings: SessionSettings,
    strings: &'static Strings,
    conversation: Arc<dyn ConversationClient>,
    speech: Arc<SpeechOutput>,
    capture: SpeechCapture,

    session: Option<Session>,
    messages: Vec<Message>,
    activity: VoiceActivity,
    status: ConversationStatus,
    emergency_banner: bool,

    exchange: Option<Exchange>,
    playback: Option<Playback>,
    countdown: Option<Countdown>,
    countdown_remaining: Option<u32>,
    next_id: u64,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl TriageSession {
    /// Create a session on the welcome screen
    #[must_use]
    pub fn new(
        settings: SessionSettings,
        conversation: Arc<dyn ConversationClient>,
        speech: Arc<SpeechOutput>,
        capture: SpeechCapture,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        Self {
            strings: settings.locale.strings(),
            settings,
            conversation,
            speech,
            capture,
            session: None,
            messages: Vec::new(),
            activity: VoiceActivity::Idle,
            status: ConversationStatus::Normal,
            emergency_banner: false,
            exchange: None,
            playback: None,
            countdown: None,
            countdown_remaining: None,
            next_id: 0,
            events_tx,
            events_rx,
            updates,
        }
    }

    /// Receive a view after every change, plus notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    // -- Queries --

    /// Whether a session is in progress
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Current session id
    #[must_use]
    pub fn session_id(&self) -> Option<uuid::Uuid> {
        self.session.as_ref().map(Session::id)
    }

    /// Conversation log in append order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Latest backend status
    #[must_use]
    pub const fn status(&self) -> ConversationStatus {
        self.status
    }

    /// Whether the opening exchange is still outstanding
    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.exchange
            .as_ref()
            .is_some_and(|e| e.kind == ExchangeKind::Opening)
    }

    /// Voice interface state
    #[must_use]
    pub fn voice_state(&self) -> VoiceState {
        VoiceState {
            activity: self.activity,
            error: self.capture.error().map(str::to_string),
        }
    }

    /// Seconds until the automatic return to welcome
    #[must_use]
    pub const fn countdown(&self) -> Option<u32> {
        self.countdown_remaining
    }

    /// Return timer phase
    #[must_use]
    pub fn timer(&self) -> ReturnTimer {
        match self.countdown_remaining {
            None => ReturnTimer::Normal,
            Some(n) if self.status == ConversationStatus::EmergencyAlert => ReturnTimer::Alerting(n),
            Some(n) => ReturnTimer::CountingDown(n),
        }
    }

    /// Control availability
    #[must_use]
    pub fn controls(&self) -> Controls {
        let active = self.session.is_some();
        let record_block = self.record_block();

        Controls {
            can_record: record_block.is_none(),
            show_finalize: active
                && matches!(
                    self.status,
                    ConversationStatus::TriageComplete | ConversationStatus::NeedsHuman
                ),
            show_unlock: active
                && matches!(
                    self.activity,
                    VoiceActivity::Speaking | VoiceActivity::Processing
                ),
            record_block,
        }
    }

    /// Snapshot for rendering
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            screen: if self.session.is_some() {
                Screen::Active
            } else {
                Screen::Welcome
            },
            session_id: self.session_id(),
            initializing: self.is_initializing(),
            messages: self.messages.clone(),
            voice: self.voice_state(),
            transcript: self.capture.transcript().to_string(),
            status: self.status,
            timer: self.timer(),
            emergency_banner: self.emergency_banner,
            controls: self.controls(),
        }
    }

    fn record_block(&self) -> Option<RecordBlock> {
        if self.session.is_none() {
            return Some(RecordBlock::NoSession);
        }
        if !self.capture.is_supported() {
            return Some(RecordBlock::Unsupported);
        }
        if self.is_initializing() {
            return Some(RecordBlock::Initializing);
        }
        if self.activity == VoiceActivity::Processing {
            return Some(RecordBlock::Processing);
        }
        if self.exchange.is_some() {
            return Some(RecordBlock::AwaitingReply);
        }

        match self.status {
            ConversationStatus::Normal => None,
            ConversationStatus::EmergencyAlert => Some(RecordBlock::EmergencyAlert),
            ConversationStatus::TriageComplete | ConversationStatus::NeedsHuman => {
                Some(RecordBlock::Concluded)
            }
        }
    }

    // -- Operations --

    /// Begin a session and request the backend's greeting
    ///
    /// Does nothing while a session is already active.
    pub fn start_triage(&mut self) {
        if self.session.is_some() {
            tracing::debug!("triage already in progress");
            return;
        }

        let session = Session::new();
        tracing::info!(session_id = %session.id(), "triage started");

        self.session = Some(session);
        self.messages.clear();
        self.status = ConversationStatus::Normal;

        let opening = self.settings.start_utterance.clone();
        self.begin_exchange(ExchangeKind::Opening, opening);
        self.publish();
    }

    /// Send a patient utterance to the backend
    ///
    /// Returns `false` if the utterance was not accepted: empty text, no
    /// session, capture still running, or an exchange already in flight.
    pub fn submit_utterance(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        if self.session.is_none() {
            tracing::warn!("utterance received without an active session");
            return false;
        }
        if self.capture.is_recording() {
            tracing::warn!("utterance submitted while still recording");
            return false;
        }
        if self.exchange.is_some() {
            tracing::warn!("exchange already in flight, dropping utterance");
            return false;
        }

        self.cancel_speech();
        self.messages.push(Message::user(text));
        self.activity = VoiceActivity::Processing;
        self.begin_exchange(ExchangeKind::Utterance, text.to_string());
        self.publish();
        true
    }

    /// Start or stop speech capture
    ///
    /// Starting interrupts any speech in progress. Refused while the
    /// controls do not allow recording.
    pub fn toggle_recording(&mut self) {
        self.capture.clear_error();

        if self.capture.is_recording() {
            tracing::debug!("stopping capture");
            self.capture.stop();
            self.publish();
            return;
        }

        if let Some(block) = self.record_block() {
            tracing::debug!(?block, "recording unavailable");
            self.publish();
            return;
        }

        self.cancel_speech();
        self.capture.reset_transcript();

        match self.capture.start() {
            Ok(()) => {
                self.activity = VoiceActivity::Recording;
                tracing::info!("recording started");
            }
            Err(e) => tracing::warn!(error = %e, "could not start recording"),
        }

        self.publish();
    }

    /// Record a backend status and start the countdown for terminal ones
    pub fn classify_status(&mut self, status: ConversationStatus) {
        self.status = status;

        if !status.is_terminal() {
            return;
        }

        tracing::info!(%status, secs = self.settings.countdown_secs, "conversation concluded, countdown started");

        if status == ConversationStatus::EmergencyAlert {
            self.emergency_banner = true;
        }

        self.cancel_countdown();

        let id = self.allocate_id();
        let tx = self.events_tx.clone();
        self.countdown = Some(Countdown::start(
            id,
            self.settings.countdown_secs,
            self.settings.tick,
            move |remaining| {
                let _ = tx.send(SessionEvent::CountdownTick { id, remaining });
            },
        ));
        self.countdown_remaining = Some(self.settings.countdown_secs);

        if self.settings.countdown_secs == 0 {
            self.return_to_welcome();
        }
    }

    /// End a concluded conversation
    pub fn finalize(&mut self) {
        tracing::info!("triage finalized");
        self.cancel_speech();
        self.return_to_welcome();
    }

    /// Abandon the session and show the welcome screen
    pub fn return_to_welcome(&mut self) {
        self.cancel_speech();
        self.cancel_countdown();
        self.abort_exchange();
        self.capture.abort();
        self.capture.clear_error();

        self.messages.clear();
        self.activity = VoiceActivity::Idle;
        self.status = ConversationStatus::Normal;
        self.emergency_banner = false;

        if let Some(session) = self.session.take() {
            tracing::info!(session_id = %session.id(), "session closed");
        }

        self.publish();
    }

    /// Unlock the voice controls when speech or processing is stuck
    ///
    /// An exchange in flight keeps running; its reply is still appended,
    /// classified and spoken when it arrives.
    pub fn emergency_reset(&mut self) {
        tracing::warn!(activity = ?self.activity, "emergency reset");

        self.cancel_speech();
        self.end_processing();
        self.capture.abort();
        self.capture.clear_error();
        self.activity = VoiceActivity::Idle;

        self.publish();
    }

    /// Apply a user command
    pub fn apply(&mut self, command: SessionCommand) {
        tracing::debug!(?command, "command");

        match command {
            SessionCommand::StartTriage => self.start_triage(),
            SessionCommand::ToggleRecording => self.toggle_recording(),
            SessionCommand::Finalize => self.finalize(),
            SessionCommand::EmergencyReset => self.emergency_reset(),
            SessionCommand::ReturnToWelcome => self.return_to_welcome(),
            SessionCommand::Shutdown => self.shutdown(),
        }
    }

    /// Cancel all background work
    pub fn shutdown(&mut self) {
        tracing::info!("session shutting down");
        self.return_to_welcome();
    }

    // -- Event loop --

    /// Wait for one background event or capture change and apply it
    pub async fn process_next(&mut self) {
        tokio::select! {
            Some(event) = self.events_rx.recv() => self.handle_event(event),
            update = self.capture.next_update() => self.handle_capture(update),
        }
    }

    /// Run until a shutdown command arrives or all command senders are gone
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        tracing::info!(locale = %self.settings.locale, "triage session running");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                update = self.capture.next_update() => self.handle_capture(update),
            }
        }

        self.shutdown();
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Exchange { id, kind, result } => self.finish_exchange(id, kind, result),
            SessionEvent::PlaybackFinished { id, outcome } => self.finish_playback(id, outcome),
            SessionEvent::CountdownTick { id, remaining } => self.countdown_tick(id, remaining),
        }
    }

    fn handle_capture(&mut self, update: CaptureUpdate) {
        match update {
            CaptureUpdate::Started => {
                tracing::debug!("recognizer listening");
            }
            CaptureUpdate::Transcript(_) => {}
            CaptureUpdate::SilenceTimeout => {
                tracing::debug!("capture stopped after silence");
            }
            CaptureUpdate::Ended | CaptureUpdate::Failed(_) => self.end_recording(),
            CaptureUpdate::Utterance(text) => {
                self.end_recording();
                if self.submit_utterance(&text) {
                    return;
                }
            }
        }

        self.publish();
    }

    // -- Background work --

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn begin_exchange(&mut self, kind: ExchangeKind, text: String) {
        let Some(session_id) = self.session_id() else {
            return;
        };

        if let Some(previous) = self.exchange.take() {
            tracing::warn!(exchange = previous.id, "replacing in-flight exchange");
            previous.task.abort();
        }

        let id = self.allocate_id();
        let client = Arc::clone(&self.conversation);
        let tx = self.events_tx.clone();

        tracing::debug!(exchange = id, ?kind, %session_id, "sending to conversation backend");

        let task = tokio::spawn(async move {
            let result = client.send_message(&text, session_id).await;
            let _ = tx.send(SessionEvent::Exchange { id, kind, result });
        });

        self.exchange = Some(Exchange { id, kind, task });
    }

    fn finish_exchange(
        &mut self,
        id: u64,
        kind: ExchangeKind,
        result: Result<Value, ConversationError>,
    ) {
        if self.exchange.as_ref().is_none_or(|e| e.id != id) {
            tracing::debug!(exchange = id, "ignoring reply for abandoned exchange");
            return;
        }
        self.exchange = None;
        self.end_processing();

        match result {
            Ok(body) => {
                let reply = parse_response(&body);
                tracing::info!(status = %reply.status, ?kind, "assistant replied");

                self.messages.push(Message::assistant(reply.message.clone()));
                self.classify_status(reply.status);
                if self.session.is_some() {
                    self.speak(&reply.message);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, ?kind, "conversation exchange failed");

                let reason = self.strings.conversation_error(&err);
                let (text, title) = match kind {
                    ExchangeKind::Opening => (
                        self.strings.opening_failed(reason),
                        self.strings.opening_failed_title,
                    ),
                    ExchangeKind::Utterance => (
                        self.strings.exchange_failed(reason),
                        self.strings.exchange_failed_title,
                    ),
                };

                self.messages.push(Message::assistant(text));
                self.notify(Notification::error(title, reason));
            }
        }

        self.publish();
    }

    fn speak(&mut self, text: &str) {
        self.cancel_speech();

        let tx = self.events_tx.clone();
        let playback = self.speech.speak(text, move |id, outcome| {
            let _ = tx.send(SessionEvent::PlaybackFinished { id, outcome });
        });

        self.activity = VoiceActivity::Speaking;
        self.playback = Some(playback);
    }

    fn finish_playback(&mut self, id: PlaybackId, outcome: PlaybackOutcome) {
        if self.playback.as_ref().is_none_or(|p| p.id() != id) {
            tracing::trace!(playback = %id, "ignoring stale playback completion");
            return;
        }

        if outcome == PlaybackOutcome::Failed {
            tracing::warn!(playback = %id, "reply could not be spoken");
        }

        self.playback = None;
        if self.activity == VoiceActivity::Speaking {
            self.activity = VoiceActivity::Idle;
        }

        self.publish();
    }

    fn countdown_tick(&mut self, id: u64, remaining: u32) {
        if self.countdown.as_ref().is_none_or(|c| c.id() != id) {
            return;
        }

        self.countdown_remaining = Some(remaining);

        if remaining == 0 {
            tracing::info!("countdown elapsed, returning to welcome");
            self.return_to_welcome();
        } else {
            self.publish();
        }
    }

    // -- Cancellation --

    fn cancel_speech(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.cancel();
        }
        if self.activity == VoiceActivity::Speaking {
            self.activity = VoiceActivity::Idle;
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }
        self.countdown_remaining = None;
    }

    fn abort_exchange(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            tracing::warn!(exchange = exchange.id, "abandoning in-flight exchange");
            exchange.task.abort();
        }
        self.end_processing();
    }

    fn end_processing(&mut self) {
        if self.activity == VoiceActivity::Processing {
            self.activity = VoiceActivity::Idle;
        }
    }

    fn end_recording(&mut self) {
        if self.activity == VoiceActivity::Recording {
            self.activity = VoiceActivity::Idle;
        }
    }

    // -- Publishing --

    fn publish(&self) {
        if self.updates.receiver_count() == 0 {
            return;
        }
        let _ = self
            .updates
            .send(SessionUpdate::Changed(Box::new(self.view())));
    }

    fn notify(&self, notification: Notification) {
        tracing::warn!(
            title = %notification.title,
            description = %notification.description,
            "notification"
        );
        let _ = self.updates.send(SessionUpdate::Notify(notification));
    }
}

impl Drop for TriageSession {
    fn drop(&mut self) {
        self.cancel_speech();
        self.cancel_countdown();
        if let Some(exchange) = self.exchange.take() {
            exchange.task.abort();
        }
    }
}
