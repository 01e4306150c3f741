//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use triage_desk::session::{SessionSettings, TriageSession};
use triage_desk::speech::{
    AudioSink, FeedRecognizer, RecognizerFeed, RecognizerSettings, SpeechCapture, SpeechOutput,
    Synthesizer, TtsBackend, recognizer_channel,
};
use triage_desk::{ConversationClient, ConversationError, Error, Locale, Result};

/// How the fake backend answers one request
pub enum Scripted {
    Reply(Value),
    Delayed(Duration, Value),
    Fail(ConversationError),
    Hang,
}

/// Conversation backend answering from a script
#[derive(Default)]
pub struct ScriptedConversation {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<(String, Uuid)>>,
}

impl ScriptedConversation {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Messages received so far, with their session ids
    pub fn requests(&self) -> Vec<(String, Uuid)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationClient for ScriptedConversation {
    async fn send_message(
        &self,
        text: &str,
        session_id: Uuid,
    ) -> std::result::Result<Value, ConversationError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), session_id));

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::Reply(json!({ "output": "ok" })));

        match next {
            Scripted::Reply(body) => Ok(body),
            Scripted::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
            Scripted::Fail(err) => Err(err),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

/// Reply envelope carrying a fenced structured reply
pub fn reply(message: &str, status: &str) -> Value {
    json!({
        "output": format!(
            "```json\n{}\n```",
            json!({ "message": message, "status": status })
        )
    })
}

/// Remote TTS that returns fixed bytes or fails
#[derive(Default)]
pub struct FakeTts {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TtsBackend for FakeTts {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Tts("service unavailable".to_string()));
        }
        Ok(vec![0xFF, 0xFB, 0x90, 0x00])
    }
}

/// Sink that "plays" for a fixed duration unless cancelled
pub struct FakeSink {
    pub duration: Duration,
    pub fail: bool,
    pub plays: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl FakeSink {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            fail: false,
            plays: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, _audio: Vec<u8>, cancel: CancellationToken) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Audio("device busy".to_string()));
        }

        tokio::select! {
            () = tokio::time::sleep(self.duration) => {}
            () = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Local synthesizer recording what it was asked to say
#[derive(Default)]
pub struct FakeSynth {
    pub spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl Synthesizer for FakeSynth {
    async fn speak(&self, text: &str, _cancel: CancellationToken) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Session wired to fakes
pub struct Harness {
    pub session: TriageSession,
    pub feed: RecognizerFeed,
    pub conversation: Arc<ScriptedConversation>,
    pub sink: Arc<FakeSink>,
}

/// Reply playback length used by [`harness`]
pub const SPEECH_DURATION: Duration = Duration::from_secs(2);

pub fn harness(script: impl IntoIterator<Item = Scripted>) -> Harness {
    harness_with(script, SPEECH_DURATION)
}

pub fn harness_with(script: impl IntoIterator<Item = Scripted>, speech: Duration) -> Harness {
    let conversation = Arc::new(ScriptedConversation::new(script));
    let sink = Arc::new(FakeSink::new(speech));
    let output = SpeechOutput::new(
        Arc::new(FakeTts::default()),
        Arc::clone(&sink) as Arc<dyn AudioSink>,
        Some(Arc::new(FakeSynth::default())),
    );

    let (events_tx, events_rx) = recognizer_channel();
    let (recognizer, feed) = FeedRecognizer::new(events_tx);
    let capture = SpeechCapture::new(
        Box::new(recognizer),
        events_rx,
        RecognizerSettings::for_locale(Locale::PtBr),
    );

    let session = TriageSession::new(
        SessionSettings::default(),
        Arc::clone(&conversation) as Arc<dyn ConversationClient>,
        Arc::new(output),
        capture,
    );

    Harness {
        session,
        feed,
        conversation,
        sink,
    }
}

/// Process session events until `done` holds
pub async fn settle(session: &mut TriageSession, done: impl Fn(&TriageSession) -> bool) {
    while !done(session) {
        tokio::time::timeout(Duration::from_secs(120), session.process_next())
            .await
            .expect("session made no progress");
    }
}

/// Process whatever arrives during `period`
pub async fn drain_for(session: &mut TriageSession, period: Duration) {
    let deadline = tokio::time::Instant::now() + period;
    while tokio::time::timeout_at(deadline, session.process_next())
        .await
        .is_ok()
    {}
}

/// Wait until `condition` holds, letting background tasks run
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
