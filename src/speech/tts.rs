//! Remote text-to-speech

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::{Error, Result};

/// ElevenLabs API root
pub const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1/";

/// Default ElevenLabs voice
pub const DEFAULT_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";

/// Default ElevenLabs model
pub const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// Converts text to encoded audio
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize `text` and return the audio bytes (MP3)
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot produce audio
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TtsProvider {
    /// A server-side proxy taking `{text}` and holding the provider key
    Proxy,
    ElevenLabs,
}

/// HTTP text-to-speech client
pub struct RemoteTts {
    client: reqwest::Client,
    url: Url,
    api_key: Option<SecretString>,
    model: String,
    provider: TtsProvider,
}

impl RemoteTts {
    /// Create a client for a TTS proxy endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new_proxy(url: Url, timeout: Duration) -> Result<Self> {
        tracing::debug!(%url, "TTS proxy configured");

        Ok(Self {
            client: build_client(timeout)?,
            url,
            api_key: None,
            model: String::new(),
            provider: TtsProvider::Proxy,
        })
    }

    /// Create a client for the ElevenLabs API
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the base URL is invalid
    pub fn new_elevenlabs(
        api_key: SecretString,
        voice_id: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(ELEVENLABS_API_URL)
            .map_err(|e| Error::Config(format!("invalid ElevenLabs URL: {e}")))?;
        Self::new_elevenlabs_at(&base, api_key, voice_id, model, timeout)
    }

    /// Create a client for an ElevenLabs-compatible API rooted at `base`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the voice URL is invalid
    pub fn new_elevenlabs_at(
        base: &Url,
        api_key: SecretString,
        voice_id: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        let url = base
            .join(&format!("text-to-speech/{voice_id}"))
            .map_err(|e| Error::Config(format!("invalid ElevenLabs voice: {e}")))?;

        tracing::debug!(voice = voice_id, model = %model, "ElevenLabs TTS configured");

        Ok(Self {
            client: build_client(timeout)?,
            url,
            api_key: Some(api_key),
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Synthesize through the proxy
    async fn synthesize_proxy(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ProxyRequest<'a> {
            text: &'a str,
        }

        let response = self
            .client
            .post(self.url.clone())
            .json(&ProxyRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!(
                "TTS proxy error {status}: {}",
                proxy_error_detail(&body)
            )));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("ElevenLabs API key required for TTS".to_string()))?;

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(self.url.clone())
            .header("xi-api-key", api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl TtsBackend for RemoteTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let audio = match self.provider {
            TtsProvider::Proxy => self.synthesize_proxy(text).await?,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await?,
        };

        if audio.is_empty() {
            return Err(Error::Tts("TTS returned no audio".to_string()));
        }

        tracing::debug!(bytes = audio.len(), chars = text.len(), "speech synthesized");
        Ok(audio)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Proxies answer failures with `{"error": "..."}`
fn proxy_error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
