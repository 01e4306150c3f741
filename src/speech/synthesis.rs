//! Local speech synthesis fallback

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::locale::Locale;
use crate::{Error, Result};

/// `espeak-ng` speaking rate at 1.0
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Speaking rate used for patients, slightly slower than normal
pub const DEFAULT_RATE: f32 = 0.9;

/// Speaks text directly on the local audio device
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `text`, returning when speech ends or `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if the synthesizer cannot be run
    async fn speak(&self, text: &str, cancel: CancellationToken) -> Result<()>;
}

/// Synthesizer backed by an `espeak-ng` compatible command
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    voice: String,
    words_per_minute: u32,
}

impl CommandSynthesizer {
    /// Create a synthesizer running `program` with the locale's voice
    #[must_use]
    pub fn new(program: impl Into<String>, locale: Locale, rate: f32) -> Self {
        Self {
            program: program.into(),
            voice: locale.synthesis_voice().to_string(),
            words_per_minute: words_per_minute(rate),
        }
    }

    fn command(&self, text: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-v")
            .arg(&self.voice)
            .arg("-s")
            .arg(self.words_per_minute.to_string())
            .arg("--")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str, cancel: CancellationToken) -> Result<()> {
        let mut child = self
            .command(text)
            .spawn()
            .map_err(|e| Error::Synthesis(format!("failed to spawn {}: {e}", self.program)))?;

        tracing::debug!(program = %self.program, voice = %self.voice, "local synthesis started");

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| Error::Synthesis(format!("failed to wait for {}: {e}", self.program)))?;
                if !status.success() {
                    return Err(Error::Synthesis(format!("{} exited with {status}", self.program)));
                }
                Ok(())
            }
            () = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to stop local synthesis");
                }
                tracing::debug!("local synthesis cancelled");
                Ok(())
            }
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn words_per_minute(rate: f32) -> u32 {
    let rate = if rate.is_finite() { rate.clamp(0.1, 10.0) } else { 1.0 };
    (BASE_WORDS_PER_MINUTE * rate).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_scales_words_per_minute() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert_eq!(words_per_minute(f32::NAN), 175);
        assert_eq!(words_per_minute(40.0), 1750);
    }

    #[test]
    fn command_uses_locale_voice() {
        let synth = CommandSynthesizer::new("espeak-ng", Locale::PtBr, 1.0);
        let command = synth.command("olá");
        let args: Vec<_> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-v", "pt-br", "-s", "175", "--", "olá"]);
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let synth = CommandSynthesizer::new("definitely-not-a-synthesizer", Locale::PtBr, 1.0);
        let result = synth.speak("olá", CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Synthesis(_))));
    }
}
