//! Audio playback

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Plays encoded audio
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio` (MP3), returning when playback ends or `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be played
    async fn play(&self, audio: Vec<u8>, cancel: CancellationToken) -> Result<()>;
}

/// Sink piping audio into an external player such as `mpg123 -q -`
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Create a player running `program` with `args`; audio is written to stdin
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Parse a whitespace separated command line
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("audio player command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self::new("mpg123".to_string(), vec!["-q".to_string(), "-".to_string()])
    }
}

#[async_trait]
impl AudioSink for CommandPlayer {
    async fn play(&self, audio: Vec<u8>, cancel: CancellationToken) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Audio(format!("failed to spawn {}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Audio("failed to open player stdin".to_string()))?;

        // Write concurrently so a player that reads slowly cannot stall cancellation
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&audio).await;
            drop(stdin);
            result
        });

        tracing::debug!(program = %self.program, "playback started");

        tokio::select! {
            status = child.wait() => {
                writer.abort();
                let status = status
                    .map_err(|e| Error::Audio(format!("failed to wait for {}: {e}", self.program)))?;
                if !status.success() {
                    return Err(Error::Audio(format!("{} exited with {status}", self.program)));
                }
                tracing::debug!("playback complete");
                Ok(())
            }
            () = cancel.cancelled() => {
                writer.abort();
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to stop audio player");
                }
                tracing::debug!("playback cancelled");
                Ok(())
            }
        }
    }
}

#[cfg(feature = "native-audio")]
pub use native::NativePlayback;

#[cfg(feature = "native-audio")]
mod native {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleRate, StreamConfig};
    use tokio_util::sync::CancellationToken;

    use super::AudioSink;
    use crate::{Error, Result};

    /// Plays MP3 audio on the default output device
    #[derive(Debug, Default, Clone, Copy)]
    pub struct NativePlayback;

    impl NativePlayback {
        /// Create a playback sink, checking an output device exists
        ///
        /// # Errors
        ///
        /// Returns error if no output device is available
        pub fn new() -> Result<Self> {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

            tracing::debug!(
                device = device.name().unwrap_or_default(),
                "audio playback initialized"
            );

            Ok(Self)
        }
    }

    #[async_trait]
    impl AudioSink for NativePlayback {
        async fn play(&self, audio: Vec<u8>, cancel: CancellationToken) -> Result<()> {
            tokio::task::spawn_blocking(move || {
                let decoded = decode_mp3(&audio)?;
                play_blocking(&decoded, &cancel)
            })
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
        }
    }

    /// Mono samples at the stream's native rate
    struct Decoded {
        samples: Vec<f32>,
        sample_rate: u32,
    }

    fn play_blocking(decoded: &Decoded, cancel: &CancellationToken) -> Result<()> {
        if decoded.samples.is_empty() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let rate = SampleRate(decoded.sample_rate);
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        let samples: Arc<[f32]> = Arc::from(decoded.samples.as_slice());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (samples.len() as u64 * 1000) / u64::from(decoded.sample_rate);
        let deadline = std::time::Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) && !cancel.is_cancelled() {
            if std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        drop(stream);
        tracing::debug!(
            samples = samples.len(),
            cancelled = cancel.is_cancelled(),
            "playback complete"
        );

        Ok(())
    }

    /// Decode MP3 bytes to mono f32 samples
    fn decode_mp3(mp3_data: &[u8]) -> Result<Decoded> {
        let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
        let mut samples = Vec::new();
        let mut sample_rate = 0;

        loop {
            match decoder.next_frame() {
                Ok(frame) => {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);
                    if frame.channels == 2 {
                        samples.extend(frame.data.chunks(2).map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        }));
                    } else {
                        samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                    }
                }
                Err(minimp3::Error::Eof) => break,
                Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
            }
        }

        if sample_rate == 0 {
            return Err(Error::Audio("MP3 stream carries no frames".to_string()));
        }

        Ok(Decoded {
            samples,
            sample_rate,
        })
    }
}
