//! Speech capture adapter
//!
//! Wraps a platform recognizer behind an explicit state machine. The
//! recognizer reports what it hears as [`RecognizerEvent`]s on a channel the
//! adapter owns; the adapter turns those into [`CaptureUpdate`]s and enforces
//! the inactivity auto-stop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::locale::{Locale, Strings};
use crate::{Error, Result};

/// Silence after the last result before capture stops by itself
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Event reported by a platform recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// The recognizer began listening
    Started,
    /// A partial or final transcript
    Result {
        /// Transcript text
        text: String,
        /// Whether the recognizer considers this result final
        is_final: bool,
    },
    /// The recognizer stopped listening
    Ended,
    /// The recognizer rejected or aborted the capture
    Error(String),
}

/// Sending half handed to recognizer implementations
pub type RecognizerSender = mpsc::UnboundedSender<RecognizerEvent>;

/// Receiving half owned by [`SpeechCapture`]
pub type RecognizerEvents = mpsc::UnboundedReceiver<RecognizerEvent>;

/// Create the channel a recognizer reports on
#[must_use]
pub fn recognizer_channel() -> (RecognizerSender, RecognizerEvents) {
    mpsc::unbounded_channel()
}

/// Recognition parameters passed on every start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognizerSettings {
    /// Recognition language
    pub locale: Locale,
    /// Keep listening after the first final result
    pub continuous: bool,
    /// Report partial results while the patient speaks
    pub interim_results: bool,
}

impl RecognizerSettings {
    /// Single-utterance recognition with interim results
    #[must_use]
    pub const fn for_locale(locale: Locale) -> Self {
        Self {
            locale,
            continuous: false,
            interim_results: true,
        }
    }
}

/// Platform speech-to-text capability
///
/// Implementations report through the [`RecognizerSender`] they were built
/// with. `stop` asks for a graceful end (an [`RecognizerEvent::Ended`] is
/// expected); `abort` tears down without further events.
pub trait Recognizer: Send {
    /// Begin listening
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot start
    fn start(&mut self, settings: &RecognizerSettings) -> Result<()>;

    /// Finish listening and deliver the final result
    fn stop(&mut self);

    /// Discard the current capture
    fn abort(&mut self);
}

/// What the adapter observed, for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureUpdate {
    /// Listening confirmed by the recognizer
    Started,
    /// Live transcript changed
    Transcript(String),
    /// Capture ended with a transcript to submit
    Utterance(String),
    /// Capture ended with nothing heard
    Ended,
    /// Recognition failed; the error is set
    Failed(String),
    /// No result arrived within the silence timeout; stop was requested
    SilenceTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Idle,
    Listening,
}

/// Speech capture state machine
pub struct SpeechCapture {
    recognizer: Option<Box<dyn Recognizer>>,
    events: Option<RecognizerEvents>,
    settings: RecognizerSettings,
    strings: &'static Strings,
    state: CaptureState,
    transcript: String,
    error: Option<String>,
    silence_timeout: Duration,
    silence_deadline: Option<Instant>,
}

impl SpeechCapture {
    /// Create an adapter around a recognizer and its event channel
    #[must_use]
    pub fn new(
        recognizer: Box<dyn Recognizer>,
        events: RecognizerEvents,
        settings: RecognizerSettings,
    ) -> Self {
        tracing::debug!(locale = %settings.locale, "speech capture initialized");

        Self {
            recognizer: Some(recognizer),
            events: Some(events),
            strings: settings.locale.strings(),
            settings,
            state: CaptureState::Idle,
            transcript: String::new(),
            error: None,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            silence_deadline: None,
        }
    }

    /// Create an adapter for a platform without speech recognition
    #[must_use]
    pub fn unsupported(locale: Locale) -> Self {
        tracing::warn!("speech recognition not supported on this platform");

        Self {
            recognizer: None,
            events: None,
            settings: RecognizerSettings::for_locale(locale),
            strings: locale.strings(),
            state: CaptureState::Idle,
            transcript: String::new(),
            error: None,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            silence_deadline: None,
        }
    }

    /// Override the inactivity auto-stop delay
    #[must_use]
    pub fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.silence_timeout = timeout;
        self
    }

    /// Whether a recognizer is available
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Whether a capture is in progress
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Listening
    }

    /// Latest interim or final transcript
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Error to show next to the voice control
    ///
    /// A missing recognizer is reported permanently.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().or_else(|| {
            (!self.is_supported()).then_some(self.strings.capture_unsupported)
        })
    }

    /// Clear a recognition error
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Forget the current transcript
    pub fn reset_transcript(&mut self) {
        self.transcript.clear();
    }

    /// When the inactivity auto-stop fires, if armed
    #[must_use]
    pub const fn silence_deadline(&self) -> Option<Instant> {
        self.silence_deadline
    }

    /// Start a capture
    ///
    /// # Errors
    ///
    /// Returns error if no recognizer is available or it refuses to start;
    /// the matching user-facing error is set as well
    pub fn start(&mut self) -> Result<()> {
        let Some(recognizer) = self.recognizer.as_mut() else {
            self.error = Some(self.strings.capture_unavailable.to_string());
            return Err(Error::Capture("no recognizer available".to_string()));
        };

        self.transcript.clear();
        self.error = None;

        if let Err(e) = recognizer.start(&self.settings) {
            tracing::error!(error = %e, "failed to start recognizer");
            self.error = Some(self.strings.recording_start_failed.to_string());
            return Err(e);
        }

        self.state = CaptureState::Listening;
        tracing::debug!("capture started");
        Ok(())
    }

    /// Ask the recognizer to finish; the utterance follows with [`RecognizerEvent::Ended`]
    pub fn stop(&mut self) {
        self.silence_deadline = None;

        if self.state == CaptureState::Idle {
            return;
        }

        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
            tracing::debug!("capture stop requested");
        }
    }

    /// Tear down the current capture without delivering an utterance
    pub fn abort(&mut self) {
        self.silence_deadline = None;

        if self.state == CaptureState::Listening {
            if let Some(recognizer) = self.recognizer.as_mut() {
                recognizer.abort();
            }
            tracing::debug!("capture aborted");
        }

        self.state = CaptureState::Idle;
        self.transcript.clear();
    }

    /// Wait for the next observable change
    ///
    /// Cancel safe. Never resolves on a platform without a recognizer.
    pub async fn next_update(&mut self) -> CaptureUpdate {
        loop {
            let deadline = self.silence_deadline;

            tokio::select! {
                event = next_event(&mut self.events) => {
                    if let Some(update) = self.apply(event) {
                        return update;
                    }
                }
                () = sleep_until(deadline) => {
                    self.silence_deadline = None;
                    if self.state == CaptureState::Listening {
                        tracing::info!(
                            timeout_secs = self.silence_timeout.as_secs(),
                            "no speech detected, stopping capture"
                        );
                        self.stop();
                        return CaptureUpdate::SilenceTimeout;
                    }
                }
            }
        }
    }

    /// Apply a recognizer event to the state machine
    pub fn apply(&mut self, event: RecognizerEvent) -> Option<CaptureUpdate> {
        // Listening is entered on start; events of an aborted capture may still be queued
        if self.state == CaptureState::Idle {
            tracing::trace!(?event, "ignoring recognizer event while idle");
            return None;
        }

        match event {
            RecognizerEvent::Started => {
                self.error = None;
                Some(CaptureUpdate::Started)
            }
            RecognizerEvent::Result { text, is_final } => {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }

                text.clone_into(&mut self.transcript);
                self.silence_deadline = Some(Instant::now() + self.silence_timeout);
                tracing::trace!(is_final, transcript = %self.transcript, "recognition result");

                Some(CaptureUpdate::Transcript(self.transcript.clone()))
            }
            RecognizerEvent::Ended => {
                self.state = CaptureState::Idle;
                self.silence_deadline = None;

                if self.transcript.is_empty() {
                    tracing::debug!("capture ended without speech");
                    Some(CaptureUpdate::Ended)
                } else {
                    let utterance = std::mem::take(&mut self.transcript);
                    tracing::debug!(chars = utterance.len(), "capture ended with utterance");
                    Some(CaptureUpdate::Utterance(utterance))
                }
            }
            RecognizerEvent::Error(reason) => {
                tracing::error!(error = %reason, "speech recognition error");
                self.state = CaptureState::Idle;
                self.silence_deadline = None;

                let message = self.strings.recognition_failed.to_string();
                self.error = Some(message.clone());
                Some(CaptureUpdate::Failed(message))
            }
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn next_event(events: &mut Option<RecognizerEvents>) -> RecognizerEvent {
    if let Some(rx) = events.as_mut() {
        if let Some(event) = rx.recv().await {
            return event;
        }
        tracing::debug!("recognizer channel closed");
        *events = None;
    }

    std::future::pending().await
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Calls {
        starts: usize,
        stops: usize,
        aborts: usize,
    }

    struct ScriptedRecognizer {
        calls: Arc<Mutex<Calls>>,
        fail_start: bool,
    }

    impl Recognizer for ScriptedRecognizer {
        fn start(&mut self, _settings: &RecognizerSettings) -> Result<()> {
            if self.fail_start {
                return Err(Error::Capture("busy".to_string()));
            }
            self.calls.lock().unwrap().starts += 1;
            Ok(())
        }

        fn stop(&mut self) {
            self.calls.lock().unwrap().stops += 1;
        }

        fn abort(&mut self) {
            self.calls.lock().unwrap().aborts += 1;
        }
    }

    fn capture(fail_start: bool) -> (SpeechCapture, RecognizerSender, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (tx, rx) = recognizer_channel();
        let recognizer = ScriptedRecognizer {
            calls: Arc::clone(&calls),
            fail_start,
        };
        let capture = SpeechCapture::new(
            Box::new(recognizer),
            rx,
            RecognizerSettings::for_locale(Locale::PtBr),
        );
        (capture, tx, calls)
    }

    fn result(text: &str, is_final: bool) -> RecognizerEvent {
        RecognizerEvent::Result {
            text: text.to_string(),
            is_final,
        }
    }

    #[test]
    fn final_transcript_becomes_utterance() {
        let (mut capture, _tx, _calls) = capture(false);
        capture.start().unwrap();
        assert!(capture.is_recording());

        assert_eq!(capture.apply(RecognizerEvent::Started), Some(CaptureUpdate::Started));
        capture.apply(result("dor", false));
        capture.apply(result(" dor no peito ", true));
        assert_eq!(capture.transcript(), "dor no peito");

        assert_eq!(
            capture.apply(RecognizerEvent::Ended),
            Some(CaptureUpdate::Utterance("dor no peito".to_string()))
        );
        assert!(!capture.is_recording());
        assert_eq!(capture.transcript(), "");
    }

    #[test]
    fn ended_without_speech() {
        let (mut capture, _tx, _calls) = capture(false);
        capture.start().unwrap();
        assert_eq!(capture.apply(RecognizerEvent::Ended), Some(CaptureUpdate::Ended));
    }

    #[test]
    fn recognition_error_sets_message_and_stops() {
        let (mut capture, _tx, _calls) = capture(false);
        capture.start().unwrap();

        let update = capture.apply(RecognizerEvent::Error("network".to_string()));
        assert!(matches!(update, Some(CaptureUpdate::Failed(_))));
        assert!(!capture.is_recording());
        assert_eq!(
            capture.error(),
            Some(Locale::PtBr.strings().recognition_failed)
        );

        capture.clear_error();
        assert_eq!(capture.error(), None);
    }

    #[test]
    fn start_failure_sets_error() {
        let (mut capture, _tx, _calls) = capture(true);
        assert!(capture.start().is_err());
        assert!(!capture.is_recording());
        assert_eq!(
            capture.error(),
            Some(Locale::PtBr.strings().recording_start_failed)
        );
    }

    #[test]
    fn unsupported_platform_reports_error() {
        let mut capture = SpeechCapture::unsupported(Locale::PtBr);
        assert!(!capture.is_supported());
        assert_eq!(
            capture.error(),
            Some(Locale::PtBr.strings().capture_unsupported)
        );
        assert!(capture.start().is_err());

        // Clearing does not hide the missing capability
        capture.clear_error();
        assert_eq!(
            capture.error(),
            Some(Locale::PtBr.strings().capture_unsupported)
        );
    }

    #[test]
    fn events_while_idle_are_ignored() {
        let (mut capture, _tx, _calls) = capture(false);
        assert_eq!(capture.apply(RecognizerEvent::Started), None);
        assert!(!capture.is_recording());
        assert_eq!(capture.apply(result("eco", true)), None);
        assert_eq!(capture.apply(RecognizerEvent::Ended), None);
        assert_eq!(capture.transcript(), "");
    }

    #[test]
    fn abort_discards_transcript() {
        let (mut capture, _tx, calls) = capture(false);
        capture.start().unwrap();
        capture.apply(result("meia frase", false));
        capture.abort();

        assert!(!capture.is_recording());
        assert_eq!(capture.transcript(), "");
        assert_eq!(capture.silence_deadline(), None);
        assert_eq!(calls.lock().unwrap().aborts, 1);
    }

    #[test]
    fn manual_stop_disarms_silence_timer() {
        let (mut capture, _tx, calls) = capture(false);
        capture.start().unwrap();
        capture.apply(result("olá", false));
        assert!(capture.silence_deadline().is_some());

        capture.stop();
        assert_eq!(capture.silence_deadline(), None);
        assert_eq!(calls.lock().unwrap().stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_auto_stops_capture() {
        let (mut capture, tx, calls) = capture(false);
        capture.start().unwrap();
        tx.send(RecognizerEvent::Started).unwrap();
        tx.send(result("estou com febre", false)).unwrap();

        assert_eq!(capture.next_update().await, CaptureUpdate::Started);
        assert!(matches!(
            capture.next_update().await,
            CaptureUpdate::Transcript(_)
        ));

        let before = Instant::now();
        assert_eq!(capture.next_update().await, CaptureUpdate::SilenceTimeout);
        assert!(Instant::now() - before >= DEFAULT_SILENCE_TIMEOUT);
        assert_eq!(calls.lock().unwrap().stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_result_rearms_silence_timer() {
        let (mut capture, tx, _calls) = capture(false);
        capture.start().unwrap();
        tx.send(result("primeira", false)).unwrap();
        capture.next_update().await;
        let first = capture.silence_deadline().unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        tx.send(result("primeira parte", false)).unwrap();
        capture.next_update().await;
        let second = capture.silence_deadline().unwrap();

        assert!(second > first);
    }
}
