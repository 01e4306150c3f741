//! Kiosk assembly and run loop

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use crate::Result;
use crate::config::{Config, SpeechConfig, TtsProvider};
use crate::console::Console;
use crate::conversation::WebhookClient;
use crate::locale::Locale;
use crate::session::{SessionCommand, TriageSession};
use crate::speech::{
    AudioSink, CommandSynthesizer, FeedRecognizer, RecognizerFeed,
    RecognizerSettings, RemoteTts, SpeechCapture, SpeechOutput, Synthesizer, TtsBackend,
    recognizer_channel,
};

/// Build the speech output service described by `config`
///
/// # Errors
///
/// Returns error if the TTS client or audio player cannot be configured
pub fn build_speech_output(config: &SpeechConfig, locale: Locale) -> Result<SpeechOutput> {
    if config.muted {
        tracing::info!("speech output muted");
        return Ok(SpeechOutput::muted());
    }

    let fallback: Option<Arc<dyn Synthesizer>> = config.synthesizer.as_ref().map(|program| {
        Arc::new(CommandSynthesizer::new(program.clone(), locale, config.rate)) as Arc<dyn Synthesizer>
    });

    let tts: Arc<dyn TtsBackend> = match &config.tts {
        TtsProvider::Proxy(url) => Arc::new(RemoteTts::new_proxy(url.clone(), config.tts_timeout)?),
        TtsProvider::ElevenLabs {
            api_key,
            voice_id,
            model,
        } => Arc::new(RemoteTts::new_elevenlabs(
            SecretString::from(api_key.expose_secret().to_owned()),
            voice_id,
            model.clone(),
            config.tts_timeout,
        )?),
        TtsProvider::Disabled => {
            tracing::info!(fallback = ?config.synthesizer, "remote TTS disabled");
            return Ok(fallback.map_or_else(SpeechOutput::muted, SpeechOutput::local));
        }
    };

    tracing::info!(provider = config.tts.name(), "speech output ready");
    Ok(SpeechOutput::new(tts, audio_sink(config)?, fallback))
}

#[cfg(feature = "native-audio")]
fn audio_sink(_config: &SpeechConfig) -> Result<Arc<dyn AudioSink>> {
    Ok(Arc::new(crate::speech::NativePlayback::new()?))
}

#[cfg(not(feature = "native-audio"))]
fn audio_sink(config: &SpeechConfig) -> Result<Arc<dyn AudioSink>> {
    Ok(Arc::new(crate::speech::CommandPlayer::from_command_line(
        &config.player,
    )?))
}

/// A triage session wired to the terminal
pub struct Kiosk {
    session: TriageSession,
    feed: RecognizerFeed,
    locale: Locale,
}

impl Kiosk {
    /// Assemble the kiosk from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the backend or speech output cannot be configured
    pub fn new(config: &Config) -> Result<Self> {
        let conversation = WebhookClient::new(
            config.backend.webhook_url.clone(),
            config.backend.timeout,
        )?;
        let speech = build_speech_output(&config.speech, config.locale)?;

        let (events_tx, events_rx) = recognizer_channel();
        let (recognizer, feed) = FeedRecognizer::new(events_tx);
        let capture = SpeechCapture::new(
            Box::new(recognizer),
            events_rx,
            RecognizerSettings::for_locale(config.locale),
        )
        .with_silence_timeout(config.speech.silence_timeout);

        let session = TriageSession::new(
            config.session_settings(),
            Arc::new(conversation),
            Arc::new(speech),
            capture,
        );

        Ok(Self {
            session,
            feed,
            locale: config.locale,
        })
    }

    /// Run until the operator quits or Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the console fails
    pub async fn run(self) -> Result<()> {
        let (commands_tx, commands_rx) = mpsc::channel(16);

        let console = Console::new(
            self.locale.strings(),
            self.feed,
            commands_tx.clone(),
            self.session.subscribe(),
            self.session.view(),
        );

        let shutdown_tx = commands_tx;
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                let _ = shutdown_tx.send(SessionCommand::Shutdown).await;
            }
        });

        let console_task = tokio::spawn(console.run(
            tokio::io::BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        ));

        self.session.run(commands_rx).await;

        if console_task.is_finished() {
            if let Ok(result) = console_task.await {
                result?;
            }
        } else {
            console_task.abort();
        }

        tracing::info!("kiosk stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn speech_config(tts: TtsProvider, muted: bool) -> SpeechConfig {
        SpeechConfig {
            tts,
            tts_timeout: Duration::from_secs(5),
            player: "mpg123 -q -".to_string(),
            synthesizer: Some("espeak-ng".to_string()),
            rate: 0.9,
            silence_timeout: Duration::from_secs(5),
            muted,
        }
    }

    #[test]
    fn builds_each_provider() {
        let proxy = TtsProvider::Proxy(url::Url::parse("http://localhost:3000/api/text-to-speech").unwrap());
        assert!(build_speech_output(&speech_config(proxy, false), Locale::PtBr).is_ok());
        assert!(build_speech_output(&speech_config(TtsProvider::Disabled, false), Locale::PtBr).is_ok());
        assert!(build_speech_output(&speech_config(TtsProvider::Disabled, true), Locale::PtBr).is_ok());
    }

    #[cfg(not(feature = "native-audio"))]
    #[test]
    fn empty_player_is_rejected() {
        let proxy = TtsProvider::Proxy(url::Url::parse("http://localhost:3000/tts").unwrap());
        let mut config = speech_config(proxy, false);
        config.player = String::new();
        assert!(build_speech_output(&config, Locale::PtBr).is_err());
    }
}
