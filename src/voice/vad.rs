//! Voice activity gate

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::capture::SampleSource;
use super::segmenter::rms_i16;
use crate::Result;
use crate::conversation::VoiceActivityProbe;

/// Samples per energy window (32ms at 16kHz)
pub const WINDOW_SAMPLES: usize = 512;

/// How often the capture buffer is inspected
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Reports voice activity when any window's RMS energy (16-bit scale)
/// exceeds the threshold
///
/// Audio captured before the voice onset is discarded; everything from the
/// onset on stays in the source for the transcriber.
pub struct EnergyVad<S: SampleSource> {
    source: Rc<S>,
}

impl<S: SampleSource> EnergyVad<S> {
    #[must_use]
    pub const fn new(source: Rc<S>) -> Self {
        Self { source }
    }
}

#[async_trait(?Send)]
impl<S: SampleSource> VoiceActivityProbe for EnergyVad<S> {
    async fn has_voice_activity(&self, timeout: Duration, energy_threshold: u32) -> Result<bool> {
        // A wait too long to represent never expires
        let deadline = Instant::now().checked_add(timeout);
        #[allow(clippy::cast_precision_loss)]
        let threshold = energy_threshold as f32;

        // Drop whatever was captured while the assistant was talking
        self.source.clear();

        loop {
            let mut samples = self.source.take_samples();
            if let Some(onset) = first_loud_window(&samples, threshold) {
                tracing::debug!(threshold, "voice activity detected");
                self.source.unread(samples.split_off(onset));
                return Ok(true);
            }

            let remaining = deadline.map_or(POLL_INTERVAL, |d| {
                d.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                tracing::debug!(timeout_secs = timeout.as_secs_f64(), "no voice activity");
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }
}

/// Offset of the first window louder than `threshold` (16-bit scale)
fn first_loud_window(samples: &[f32], threshold: f32) -> Option<usize> {
    samples
        .chunks(WINDOW_SAMPLES)
        .position(|window| rms_i16(window) > threshold)
        .map(|index| index * WINDOW_SAMPLES)
}
