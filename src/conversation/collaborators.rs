//! Interfaces to the I/O collaborators driven by the conversation engine
//!
//! Audio device handles are not `Send`, so the async traits are declared
//! `?Send` and the whole voice loop runs on a single task.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::prompt::PromptPayload;
use crate::Result;

/// Blocks until the wake phrase is heard
#[async_trait(?Send)]
pub trait WakeTrigger {
    /// Wait for the next wake event
    ///
    /// # Errors
    ///
    /// Returns error if the detector can no longer listen; this is fatal for
    /// the whole session loop
    async fn wait_for_wake(&self) -> Result<()>;
}

/// Decides whether speech starts within a bounded wait
#[async_trait(?Send)]
pub trait VoiceActivityProbe {
    /// Returns `Ok(false)` when `timeout` elapses without activity
    ///
    /// # Errors
    ///
    /// Returns error if the audio source fails
    async fn has_voice_activity(&self, timeout: Duration, energy_threshold: u32) -> Result<bool>;
}

/// Captures one utterance and converts it to text
#[async_trait(?Send)]
pub trait Transcriber {
    /// Transcribe the next utterance; may return empty text
    ///
    /// # Errors
    ///
    /// Returns error if capture or recognition fails
    async fn transcribe(&self) -> Result<String>;
}

/// Calls a language model
#[async_trait(?Send)]
pub trait ModelClient {
    /// Generate a reply for `prompt`, bounded by `max_tokens`; may be empty
    ///
    /// # Errors
    ///
    /// Returns error if the model cannot be reached or the payload shape is
    /// not supported by this client
    async fn generate(&self, prompt: &PromptPayload, max_tokens: u32) -> Result<String>;
}

/// Speaks text aloud
#[async_trait(?Send)]
pub trait SpeechSynthesizer {
    /// Synthesize and play `text`, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Outcome recorded for a logged turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Failed,
}

impl TurnStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exchange handed to the durable turn log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub user_input: String,
    pub assistant_response: Option<String>,
    pub status: TurnStatus,
    pub error_message: Option<String>,
}

impl TurnRecord {
    #[must_use]
    pub fn completed(user_input: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            assistant_response: Some(response.into()),
            status: TurnStatus::Completed,
            error_message: None,
        }
    }

    #[must_use]
    pub fn failed(user_input: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            assistant_response: None,
            status: TurnStatus::Failed,
            error_message: Some(error.into()),
        }
    }
}

/// Durable sink for completed and failed turns
///
/// The engine never depends on the result; errors are only logged.
pub trait TurnLog {
    /// Persist one turn
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written
    fn log_turn(&self, record: &TurnRecord) -> Result<()>;
}

/// Borrowed handles to every collaborator of one voice loop
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub wake: &'a dyn WakeTrigger,
    pub voice: &'a dyn VoiceActivityProbe,
    pub transcriber: &'a dyn Transcriber,
    pub model: &'a dyn ModelClient,
    pub speaker: &'a dyn SpeechSynthesizer,
    pub log: &'a dyn TurnLog,
}

/// Turn log that discards everything (logging disabled)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl TurnLog for NullLog {
    fn log_turn(&self, _record: &TurnRecord) -> Result<()> {
        Ok(())
    }
}
