//! Utterance recording and transcription

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::capture::{SAMPLE_RATE, SampleSource, samples_to_wav};
use super::segmenter::{SegmentState, SegmenterConfig, SpeechSegmenter, threshold_from_i16};
use super::stt::SpeechToText;
use crate::Result;
use crate::conversation::Transcriber;

/// Capture chunk interval (100ms at 16kHz)
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Records the utterance that follows a positive VAD check and sends it to
/// the STT backend
pub struct UtteranceRecorder<S: SampleSource> {
    source: Rc<S>,
    stt: SpeechToText,
    segments: SegmenterConfig,
}

impl<S: SampleSource> UtteranceRecorder<S> {
    /// `energy_threshold` is on the 16-bit scale, same as the VAD gate
    #[must_use]
    pub fn new(source: Rc<S>, stt: SpeechToText, energy_threshold: u32) -> Self {
        Self {
            source,
            stt,
            segments: SegmenterConfig::utterance(threshold_from_i16(energy_threshold)),
        }
    }
}

#[async_trait(?Send)]
impl<S: SampleSource> Transcriber for UtteranceRecorder<S> {
    async fn transcribe(&self) -> Result<String> {
        let samples = record_utterance(self.source.as_ref(), self.segments, CHUNK_INTERVAL).await;
        if samples.is_empty() {
            tracing::debug!("no usable speech captured");
            return Ok(String::new());
        }

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        self.stt.transcribe(&wav).await
    }
}

/// Read `source` until the utterance ends
///
/// Returns an empty buffer if the speech turned out too short to keep.
pub async fn record_utterance<S: SampleSource + ?Sized>(
    source: &S,
    config: SegmenterConfig,
    interval: Duration,
) -> Vec<f32> {
    let mut segmenter = SpeechSegmenter::new(config);
    segmenter.begin();

    #[allow(clippy::cast_precision_loss)]
    let cap = Duration::from_secs_f32(config.max_samples as f32 / SAMPLE_RATE as f32);
    let deadline = Instant::now() + cap + Duration::from_secs(1);

    loop {
        let chunk = source.take_samples();
        if let Some(segment) = segmenter.push(&chunk) {
            return segment;
        }
        if segmenter.state() == SegmentState::Idle {
            return Vec::new();
        }
        if Instant::now() >= deadline {
            tracing::debug!("recording deadline reached");
            return segmenter.buffered().to_vec();
        }
        tokio::time::sleep(interval).await;
    }
}
