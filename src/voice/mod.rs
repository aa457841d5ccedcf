//! Voice processing module
//!
//! Handles audio capture, energy-gated voice detection, wake word listening,
//! STT/TTS over HTTP, and playback. Each adapter implements one of the
//! conversation collaborator traits.

mod capture;
mod playback;
mod recorder;
mod segmenter;
mod stt;
mod tts;
mod vad;
mod wake_word;

pub use capture::{AudioCapture, SAMPLE_RATE, SampleSource, samples_to_wav};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3};
pub use recorder::{UtteranceRecorder, record_utterance};
pub use segmenter::{
    SegmentState, SegmenterConfig, SpeechSegmenter, rms, rms_i16, threshold_from_i16,
};
pub use stt::{SpeechToText, SttBackend};
pub use tts::{Speaker, TextToSpeech, TtsBackend};
pub use vad::EnergyVad;
pub use wake_word::{WakeListener, WakeWordMatcher};
