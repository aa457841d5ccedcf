//! Wake word detection
//!
//! Hybrid approach: local energy segmentation finds candidate phrases, then
//! the STT backend verifies whether the wake word was actually said.

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

use super::capture::{SAMPLE_RATE, SampleSource, samples_to_wav};
use super::segmenter::{SegmenterConfig, SpeechSegmenter, threshold_from_i16};
use super::stt::SpeechToText;
use crate::conversation::WakeTrigger;
use crate::{Error, Result};

/// Capture chunk interval (100ms at 16kHz)
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Candidate phrases shorter than this are not sent to STT
const MIN_CANDIDATE_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// Consecutive STT failures after which listening is abandoned
const MAX_STT_FAILURES: u32 = 5;

/// Matches transcripts against a set of wake words
#[derive(Debug, Clone)]
pub struct WakeWordMatcher {
    wake_words: Vec<String>,
}

impl WakeWordMatcher {
    /// Create a matcher; wake words are trimmed and lowercased
    ///
    /// # Errors
    ///
    /// Returns error if no non-blank wake word is given
    pub fn new<I, S>(wake_words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized: Vec<String> = wake_words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(Error::WakeWord("at least one wake word is required".to_string()));
        }

        tracing::debug!(wake_words = ?normalized, "wake word matcher initialized");
        Ok(Self {
            wake_words: normalized,
        })
    }

    /// Check whether `transcript` contains a wake word
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();
        self.wake_words
            .iter()
            .any(|w| normalized.contains(w.as_str()))
    }

    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }
}

/// Listens to the microphone until the wake word is heard
///
/// Speech is gated on the same 16-bit energy threshold as the conversation's
/// voice activity check, so one setting tunes both for the room.
pub struct WakeListener<S: SampleSource> {
    source: Rc<S>,
    stt: SpeechToText,
    matcher: WakeWordMatcher,
    segments: SegmenterConfig,
}

impl<S: SampleSource> WakeListener<S> {
    #[must_use]
    pub fn new(
        source: Rc<S>,
        stt: SpeechToText,
        matcher: WakeWordMatcher,
        energy_threshold: u32,
    ) -> Self {
        Self {
            source,
            stt,
            matcher,
            segments: SegmenterConfig::wake_phrase(threshold_from_i16(energy_threshold)),
        }
    }
}

#[async_trait(?Send)]
impl<S: SampleSource> WakeTrigger for WakeListener<S> {
    async fn wait_for_wake(&self) -> Result<()> {
        let mut segmenter = SpeechSegmenter::new(self.segments);
        let mut failures = 0u32;

        self.source.clear();
        tracing::info!(wake_words = ?self.matcher.wake_words(), "listening for wake word");

        loop {
            tokio::time::sleep(CHUNK_INTERVAL).await;

            let samples = self.source.take_samples();
            let Some(candidate) = segmenter.push(&samples) else {
                continue;
            };
            if candidate.len() < MIN_CANDIDATE_SAMPLES {
                continue;
            }

            tracing::debug!(samples = candidate.len(), "checking for wake word");
            let wav = samples_to_wav(&candidate, SAMPLE_RATE)?;

            match self.stt.transcribe(&wav).await {
                Ok(transcript) => {
                    failures = 0;
                    if self.matcher.matches(&transcript) {
                        tracing::info!(transcript = %transcript, "wake word detected");
                        self.source.clear();
                        return Ok(());
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "wake word transcription failed");
                    if failures >= MAX_STT_FAILURES {
                        return Err(Error::WakeWord(format!(
                            "transcription failed {failures} times in a row: {e}"
                        )));
                    }
                }
            }
        }
    }
}
