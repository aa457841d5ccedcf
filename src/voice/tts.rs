//! Text-to-speech (TTS) processing

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use super::playback::AudioPlayback;
use crate::conversation::SpeechSynthesizer;
use crate::{Error, Result};

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const ELEVENLABS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// TTS provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsBackend {
    OpenAi,
    ElevenLabs,
}

impl TtsBackend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::ElevenLabs => "elevenlabs",
        }
    }
}

impl fmt::Display for TtsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TtsBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

#[derive(Serialize)]
struct OpenAiSpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// Synthesizes MP3 speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    backend: TtsBackend,
    api_key: String,
    voice: String,
    model: String,
    speed: f32,
}

impl TextToSpeech {
    /// Create a synthesizer for `backend`
    ///
    /// `speed` only applies to `OpenAI`; `voice` is the voice id for ElevenLabs.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        backend: TtsBackend,
        api_key: String,
        voice: String,
        model: String,
        speed: f32,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!("{backend} API key required for TTS")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            backend,
            api_key,
            voice,
            model,
            speed,
        })
    }

    /// Synthesize `text`, returning MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = match self.backend {
            TtsBackend::OpenAi => self
                .client
                .post(OPENAI_SPEECH_URL)
                .bearer_auth(&self.api_key)
                .json(&OpenAiSpeechRequest {
                    model: &self.model,
                    input: text,
                    voice: &self.voice,
                    speed: self.speed,
                }),
            TtsBackend::ElevenLabs => self
                .client
                .post(format!("{ELEVENLABS_URL}/{}", self.voice))
                .header("xi-api-key", &self.api_key)
                .json(&ElevenLabsRequest {
                    text,
                    model_id: &self.model,
                }),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("{} TTS error {status}: {body}", self.backend)));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), backend = %self.backend, "speech synthesized");
        Ok(audio.to_vec())
    }
}

/// Speaks through the default output device
pub struct Speaker {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl Speaker {
    #[must_use]
    pub const fn new(tts: TextToSpeech, playback: AudioPlayback) -> Self {
        Self { tts, playback }
    }
}

#[async_trait(?Send)]
impl SpeechSynthesizer for Speaker {
    async fn speak(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        tracing::debug!(text, "speaking");
        let audio = self.tts.synthesize(text).await?;
        self.playback.play_mp3(&audio).await
    }
}
