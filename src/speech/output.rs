//! Speech output service
//!
//! Speaks assistant replies: remote TTS played through an [`AudioSink`],
//! falling back to a local [`Synthesizer`] when either step fails. Each
//! request is a [`Playback`] that can be cancelled at any time and reports
//! completion exactly once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::playback::AudioSink;
use super::synthesis::Synthesizer;
use super::tts::TtsBackend;

/// Identifies one speak request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a speak request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Remote audio played to the end
    Completed,
    /// Spoken by the local synthesizer
    Fallback,
    /// Stopped by [`Playback::cancel`]
    Cancelled,
    /// Nothing could be spoken
    Failed,
    /// Output is muted
    Muted,
}

/// Handle to an in-progress speak request
///
/// Dropping the handle cancels the request.
#[derive(Debug)]
pub struct Playback {
    id: PlaybackId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Playback {
    /// Request id, echoed in the completion callback
    #[must_use]
    pub const fn id(&self) -> PlaybackId {
        self.id
    }

    /// Stop speaking; safe to call repeatedly
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(playback = %self.id, "cancelling speech");
            self.cancel.cancel();
        }
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the request has fully ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Injectable speech output service
pub struct SpeechOutput {
    tts: Option<Arc<dyn TtsBackend>>,
    sink: Option<Arc<dyn AudioSink>>,
    fallback: Option<Arc<dyn Synthesizer>>,
    next_id: AtomicU64,
}

impl SpeechOutput {
    /// Remote TTS through `sink`, with an optional local fallback
    #[must_use]
    pub fn new(
        tts: Arc<dyn TtsBackend>,
        sink: Arc<dyn AudioSink>,
        fallback: Option<Arc<dyn Synthesizer>>,
    ) -> Self {
        Self {
            tts: Some(tts),
            sink: Some(sink),
            fallback,
            next_id: AtomicU64::new(1),
        }
    }

    /// Local synthesis only
    #[must_use]
    pub fn local(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            tts: None,
            sink: None,
            fallback: Some(synthesizer),
            next_id: AtomicU64::new(1),
        }
    }

    /// Output that speaks nothing
    #[must_use]
    pub const fn muted() -> Self {
        Self {
            tts: None,
            sink: None,
            fallback: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Start speaking `text`
    ///
    /// `on_done` runs exactly once when the request ends, whether it
    /// completed, fell back, failed or was cancelled. Must be called from a
    /// Tokio runtime.
    pub fn speak<F>(&self, text: &str, on_done: F) -> Playback
    where
        F: FnOnce(PlaybackId, PlaybackOutcome) + Send + 'static,
    {
        let id = PlaybackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();

        let request = Request {
            tts: self.tts.clone(),
            sink: self.sink.clone(),
            fallback: self.fallback.clone(),
            text: text.to_string(),
            cancel: cancel.clone(),
        };

        tracing::debug!(playback = %id, chars = text.len(), "speaking");

        let task = tokio::spawn(async move {
            let outcome = request.run().await;
            tracing::debug!(playback = %id, ?outcome, "speech finished");
            on_done(id, outcome);
        });

        Playback { id, cancel, task }
    }
}

struct Request {
    tts: Option<Arc<dyn TtsBackend>>,
    sink: Option<Arc<dyn AudioSink>>,
    fallback: Option<Arc<dyn Synthesizer>>,
    text: String,
    cancel: CancellationToken,
}

impl Request {
    async fn run(self) -> PlaybackOutcome {
        if let (Some(tts), Some(sink)) = (&self.tts, &self.sink) {
            let synthesized = tokio::select! {
                result = tts.synthesize(&self.text) => result,
                () = self.cancel.cancelled() => return PlaybackOutcome::Cancelled,
            };

            match synthesized {
                Ok(audio) => match sink.play(audio, self.cancel.clone()).await {
                    Ok(()) => return self.finished(PlaybackOutcome::Completed),
                    Err(e) => {
                        tracing::warn!(error = %e, "audio playback failed, using local synthesis");
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "remote TTS failed, using local synthesis");
                }
            }

            if self.cancel.is_cancelled() {
                return PlaybackOutcome::Cancelled;
            }
        }

        let Some(fallback) = &self.fallback else {
            return if self.tts.is_some() {
                PlaybackOutcome::Failed
            } else {
                PlaybackOutcome::Muted
            };
        };

        match fallback.speak(&self.text, self.cancel.clone()).await {
            Ok(()) => self.finished(PlaybackOutcome::Fallback),
            Err(e) => {
                tracing::error!(error = %e, "local synthesis failed");
                PlaybackOutcome::Failed
            }
        }
    }

    fn finished(&self, outcome: PlaybackOutcome) -> PlaybackOutcome {
        if self.cancel.is_cancelled() {
            PlaybackOutcome::Cancelled
        } else {
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    async fn finished(output: &SpeechOutput, text: &str) -> PlaybackOutcome {
        let (tx, rx) = oneshot::channel();
        let _playback = output.speak(text, move |_, outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn muted_output_finishes_immediately() {
        let output = SpeechOutput::muted();
        assert_eq!(finished(&output, "olá").await, PlaybackOutcome::Muted);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let output = SpeechOutput::muted();
        let a = output.speak("a", |_, _| {});
        let b = output.speak("b", |_, _| {});
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let output = SpeechOutput::muted();
        let playback = output.speak("olá", |_, _| {});
        playback.cancel();
        playback.cancel();
        assert!(playback.is_cancelled());
    }
}
