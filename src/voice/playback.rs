//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Samples queued for the output callback
struct Cursor32 {
    samples: Vec<f32>,
    position: usize,
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device at 24kHz, mono if possible
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device exists
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| -> Result<Option<cpal::SupportedStreamConfigRange>> {
            Ok(device
                .supported_output_configs()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|c| {
                    c.channels() == channels
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                }))
        };

        let supported = match supports(1)? {
            Some(c) => c,
            None => supports(2)?
                .ok_or_else(|| Error::Audio("no 24kHz output config".to_string()))?,
        };

        let config = supported
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Play mono f32 samples at [`PLAYBACK_SAMPLE_RATE`] and wait until done
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub async fn play(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let cursor = Arc::new(Mutex::new(Cursor32 {
            samples,
            position: 0,
        }));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let cursor = Arc::clone(&cursor);
            let finished = Arc::clone(&finished);
            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let Ok(mut cursor) = cursor.lock() else {
                            data.fill(0.0);
                            return;
                        };
                        for frame in data.chunks_mut(channels) {
                            let sample = cursor.samples.get(cursor.position).copied();
                            match sample {
                                Some(s) => {
                                    frame.fill(s);
                                    cursor.position += 1;
                                }
                                None => {
                                    frame.fill(0.0);
                                    finished.store(true, Ordering::Release);
                                }
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

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Let the device drain its last buffer
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(stream);

        tracing::debug!(samples = sample_count, "playback complete");
        Ok(())
    }

    /// Decode and play MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub async fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let samples = decode_mp3(mp3_data)?;
        self.play(samples).await
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let channels = frame.channels.max(1);
                samples.extend(frame.data.chunks(channels).map(downmix));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

/// Average one interleaved frame of i16 samples into a single f32
#[allow(clippy::cast_precision_loss)]
fn downmix(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32768.0).sum();
    sum / frame.len() as f32
}
