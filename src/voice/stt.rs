//! Speech-to-text (STT) over HTTP

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

/// Response from `OpenAI` Whisper transcription API
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramResponse {
    fn into_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

/// STT provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttBackend {
    Whisper,
    Deepgram,
}

impl SttBackend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whisper => "whisper",
            Self::Deepgram => "deepgram",
        }
    }
}

impl fmt::Display for SttBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SttBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Transcribes WAV audio to text
#[derive(Clone)]
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    backend: SttBackend,
}

impl SpeechToText {
    /// Create a transcriber for `backend`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(backend: SttBackend, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!("{backend} API key required for STT")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            backend,
        })
    }

    #[must_use]
    pub const fn backend(&self) -> SttBackend {
        self.backend
    }

    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API rejects the audio
    pub async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), backend = %self.backend, "starting transcription");

        let response = match self.backend {
            SttBackend::Whisper => {
                let part = reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?;
                let form = reqwest::multipart::Form::new()
                    .part("file", part)
                    .text("model", self.model.clone());

                self.client
                    .post(WHISPER_URL)
                    .bearer_auth(&self.api_key)
                    .multipart(form)
                    .send()
                    .await?
            }
            SttBackend::Deepgram => {
                self.client
                    .post(DEEPGRAM_URL)
                    .query(&[("model", self.model.as_str()), ("punctuate", "true")])
                    .header("Authorization", format!("Token {}", self.api_key))
                    .header("Content-Type", "audio/wav")
                    .body(wav.to_vec())
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::Stt(format!("{} API error {status}: {body}", self.backend)));
        }

        let transcript = match self.backend {
            SttBackend::Whisper => response.json::<WhisperResponse>().await?.text,
            SttBackend::Deepgram => response.json::<DeepgramResponse>().await?.into_transcript(),
        };

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("whisper".parse::<SttBackend>().unwrap(), SttBackend::Whisper);
        assert_eq!("Deepgram".parse::<SttBackend>().unwrap(), SttBackend::Deepgram);
        assert!(matches!("vosk".parse::<SttBackend>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_key_rejected() {
        let result = SpeechToText::new(SttBackend::Whisper, String::new(), "whisper-1".into());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_deepgram_transcript_extraction() {
        let body = r#"{"results":{"channels":[{"alternatives":[{"transcript":"hello there"}]}]}}"#;
        let parsed: DeepgramResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_transcript(), "hello there");

        let empty: DeepgramResponse = serde_json::from_str(r#"{"results":{"channels":[]}}"#).unwrap();
        assert_eq!(empty.into_transcript(), "");
    }
}
