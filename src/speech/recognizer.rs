//! Channel-fed recognizer
//!
//! Stands in for a platform recognizer where transcripts come from
//! somewhere else: a terminal, a test, or an external STT process.
//! [`RecognizerFeed`] pushes what was heard; [`FeedRecognizer`] is handed to
//! [`SpeechCapture`](super::SpeechCapture).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::capture::{Recognizer, RecognizerEvent, RecognizerSender, RecognizerSettings};
use crate::{Error, Result};

/// Recognizer driven through a [`RecognizerFeed`]
pub struct FeedRecognizer {
    events: RecognizerSender,
    listening: Arc<AtomicBool>,
    continuous: Arc<AtomicBool>,
}

/// Handle used to deliver transcripts to a [`FeedRecognizer`]
#[derive(Clone)]
pub struct RecognizerFeed {
    events: RecognizerSender,
    listening: Arc<AtomicBool>,
    continuous: Arc<AtomicBool>,
}

impl FeedRecognizer {
    /// Create a recognizer reporting on `events`, plus its feed
    #[must_use]
    pub fn new(events: RecognizerSender) -> (Self, RecognizerFeed) {
        let listening = Arc::new(AtomicBool::new(false));
        let continuous = Arc::new(AtomicBool::new(false));

        let recognizer = Self {
            events: events.clone(),
            listening: Arc::clone(&listening),
            continuous: Arc::clone(&continuous),
        };
        let feed = RecognizerFeed {
            events,
            listening,
            continuous,
        };

        (recognizer, feed)
    }
}

impl Recognizer for FeedRecognizer {
    fn start(&mut self, settings: &RecognizerSettings) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(Error::Capture("recognizer already started".to_string()));
        }

        self.continuous.store(settings.continuous, Ordering::SeqCst);
        self.events
            .send(RecognizerEvent::Started)
            .map_err(|_| Error::Capture("recognizer channel closed".to_string()))
    }

    fn stop(&mut self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(RecognizerEvent::Ended);
        }
    }

    fn abort(&mut self) {
        self.listening.store(false, Ordering::SeqCst);
    }
}

impl RecognizerFeed {
    /// Whether the recognizer is currently listening
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Deliver a partial transcript
    ///
    /// Returns `false` when the recognizer is not listening.
    pub fn partial(&self, text: &str) -> bool {
        self.send_result(text, false)
    }

    /// Deliver a final transcript
    ///
    /// A single-utterance capture ends here; a continuous one keeps
    /// listening until stopped. Returns `false` when the recognizer is not
    /// listening.
    pub fn say(&self, text: &str) -> bool {
        if !self.send_result(text, true) {
            return false;
        }

        if !self.continuous.load(Ordering::SeqCst) && self.listening.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(RecognizerEvent::Ended);
        }
        true
    }

    /// Report a recognition failure and end the capture
    pub fn fail(&self, reason: &str) {
        if self.listening.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(RecognizerEvent::Error(reason.to_string()));
        }
    }

    fn send_result(&self, text: &str, is_final: bool) -> bool {
        if !self.is_listening() {
            tracing::debug!("transcript dropped, recognizer not listening");
            return false;
        }

        self.events
            .send(RecognizerEvent::Result {
                text: text.to_string(),
                is_final,
            })
            .is_ok()
    }
}
