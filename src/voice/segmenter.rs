//! Energy-based speech segmentation
//!
//! Splits a sample stream into utterances: speech starts when a chunk's RMS
//! energy rises above the threshold and ends after enough trailing silence.

use super::SAMPLE_RATE;

/// Full scale of 16-bit PCM, used to express energy in integer units
const I16_SCALE: f32 = 32768.0;

/// Thresholds controlling where an utterance starts and ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    /// RMS energy (0.0-1.0 scale) above which a chunk is speech
    pub energy_threshold: f32,
    /// Speech (not silence) needed before a segment is worth keeping
    pub min_speech_samples: usize,
    /// Silence that closes a segment
    pub trailing_silence_samples: usize,
    /// Hard cap on segment length
    pub max_samples: usize,
}

impl SegmenterConfig {
    /// Short phrases such as a wake word
    #[must_use]
    pub const fn wake_phrase(energy_threshold: f32) -> Self {
        Self {
            energy_threshold,
            min_speech_samples: SAMPLE_RATE as usize * 3 / 10,
            trailing_silence_samples: SAMPLE_RATE as usize / 2,
            max_samples: SAMPLE_RATE as usize * 5,
        }
    }

    /// A full user request
    #[must_use]
    pub const fn utterance(energy_threshold: f32) -> Self {
        Self {
            energy_threshold,
            min_speech_samples: SAMPLE_RATE as usize * 3 / 10,
            trailing_silence_samples: SAMPLE_RATE as usize * 8 / 10,
            max_samples: SAMPLE_RATE as usize * 15,
        }
    }
}

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Speaking,
}

/// Accumulates speech and reports finished segments
pub struct SpeechSegmenter {
    config: SegmenterConfig,
    state: SegmentState,
    buffer: Vec<f32>,
    speech: usize,
    silence: usize,
}

impl SpeechSegmenter {
    #[must_use]
    pub const fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: SegmentState::Idle,
            buffer: Vec::new(),
            speech: 0,
            silence: 0,
        }
    }

    /// Feed a chunk; returns a segment once it is complete
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let energy = rms(samples);
        let is_speech = energy > self.config.energy_threshold;

        match self.state {
            SegmentState::Idle => {
                if is_speech {
                    self.state = SegmentState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.speech = samples.len();
                    self.silence = 0;
                    tracing::trace!(energy, "speech started");
                }
                None
            }
            SegmentState::Speaking => {
                self.buffer.extend_from_slice(samples);
                if is_speech {
                    self.speech += samples.len();
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                let long_enough = self.speech > self.config.min_speech_samples;
                if (self.silence > self.config.trailing_silence_samples && long_enough)
                    || self.buffer.len() >= self.config.max_samples
                {
                    tracing::debug!(samples = self.buffer.len(), "speech segment complete");
                    let segment = std::mem::take(&mut self.buffer);
                    self.reset();
                    return Some(segment);
                }

                // Too much silence without enough speech
                if self.silence > self.config.trailing_silence_samples * 2 {
                    tracing::trace!("segment too short, discarding");
                    self.reset();
                }
                None
            }
        }
    }

    /// Treat the stream as already speaking (voice was detected upstream)
    pub fn begin(&mut self) {
        self.state = SegmentState::Speaking;
        self.buffer.clear();
        self.speech = 0;
        self.silence = 0;
    }

    /// Drop any partial segment and return to idle
    pub fn reset(&mut self) {
        self.state = SegmentState::Idle;
        self.buffer.clear();
        self.speech = 0;
        self.silence = 0;
    }

    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    /// Partial segment accumulated so far
    #[must_use]
    pub fn buffered(&self) -> &[f32] {
        &self.buffer
    }
}

/// RMS energy of samples on the 0.0-1.0 scale
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// RMS energy on the 16-bit PCM scale (0-32768)
#[must_use]
pub fn rms_i16(samples: &[f32]) -> f32 {
    rms(samples) * I16_SCALE
}

/// Convert a 16-bit scale threshold to the 0.0-1.0 scale
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn threshold_from_i16(threshold: u32) -> f32 {
    threshold as f32 / I16_SCALE
}
