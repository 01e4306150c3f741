//! Speech input and output
//!
//! Capture turns recognizer events into patient utterances; output speaks
//! assistant replies through remote TTS with a local synthesis fallback.

mod capture;
mod output;
mod playback;
mod recognizer;
mod synthesis;
mod tts;

pub use capture::{
    CaptureUpdate, DEFAULT_SILENCE_TIMEOUT, Recognizer, RecognizerEvent, RecognizerEvents,
    RecognizerSender, RecognizerSettings, SpeechCapture, recognizer_channel,
};
pub use output::{Playback, PlaybackId, PlaybackOutcome, SpeechOutput};
#[cfg(feature = "native-audio")]
pub use playback::NativePlayback;
pub use playback::{AudioSink, CommandPlayer};
pub use recognizer::{FeedRecognizer, RecognizerFeed};
pub use synthesis::{CommandSynthesizer, DEFAULT_RATE, Synthesizer};
pub use tts::{DEFAULT_MODEL, DEFAULT_VOICE_ID, ELEVENLABS_API_URL, RemoteTts, TtsBackend};
