//! Shared test utilities
//!
//! Scripted collaborators: each fake pops its next answer from a queue and
//! records how it was called.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vigil::conversation::{
    Collaborators, ModelClient, SpeechSynthesizer, Transcriber, TurnLog, TurnRecord,
    VoiceActivityProbe, WakeTrigger,
};
use vigil::{DbPool, Error, PromptPayload, Result, SessionConfig, db};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Session config with a short timeout so nothing in a test waits long
#[must_use]
pub fn test_config() -> SessionConfig {
    SessionConfig {
        awaiting_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

/// Fires a fixed number of times, then cancels the token and waits forever
pub struct ScriptedWake {
    remaining: Cell<u32>,
    cancel: CancellationToken,
    fail: bool,
    pub calls: Cell<u32>,
}

impl ScriptedWake {
    pub fn new(wakes: u32, cancel: CancellationToken) -> Self {
        Self {
            remaining: Cell::new(wakes),
            cancel,
            fail: false,
            calls: Cell::new(0),
        }
    }

    /// Wake trigger that errors on first use
    pub fn failing(cancel: CancellationToken) -> Self {
        Self {
            fail: true,
            ..Self::new(0, cancel)
        }
    }
}

#[async_trait(?Send)]
impl WakeTrigger for ScriptedWake {
    async fn wait_for_wake(&self) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(Error::WakeWord("microphone unplugged".to_string()));
        }

        let left = self.remaining.get();
        if left > 0 {
            self.remaining.set(left - 1);
            return Ok(());
        }

        self.cancel.cancel();
        std::future::pending().await
    }
}

/// Answers voice-activity checks from a script; silence once exhausted
#[derive(Default)]
pub struct ScriptedVoice {
    script: RefCell<VecDeque<bool>>,
    cancel: Option<CancellationToken>,
    pub calls: Cell<u32>,
    pub last_timeout: Cell<Option<Duration>>,
    pub last_threshold: Cell<Option<u32>>,
}

impl ScriptedVoice {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: RefCell::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Simulates Ctrl-C while waiting for the user to speak
    pub fn cancelling(cancel: CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::default()
        }
    }
}

#[async_trait(?Send)]
impl VoiceActivityProbe for ScriptedVoice {
    async fn has_voice_activity(&self, timeout: Duration, energy_threshold: u32) -> Result<bool> {
        self.calls.set(self.calls.get() + 1);
        self.last_timeout.set(Some(timeout));
        self.last_threshold.set(Some(energy_threshold));
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
            return std::future::pending().await;
        }
        Ok(self.script.borrow_mut().pop_front().unwrap_or(false))
    }
}

/// Returns scripted transcripts; empty once exhausted
#[derive(Default)]
pub struct ScriptedTranscriber {
    script: RefCell<VecDeque<Result<String>>>,
    cancel: Option<CancellationToken>,
    pub calls: Cell<u32>,
}

impl ScriptedTranscriber {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: RefCell::new(texts.into_iter().map(|t| Ok(t.into())).collect()),
            ..Self::default()
        }
    }

    /// Simulates Ctrl-C while the utterance is being recorded
    pub fn cancelling(cancel: CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::default()
        }
    }

    /// Queue a failure after the scripted transcripts
    pub fn then_fail(self, error: Error) -> Self {
        self.script.borrow_mut().push_back(Err(error));
        self
    }
}

#[async_trait(?Send)]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
            return std::future::pending().await;
        }
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Returns scripted replies and keeps every prompt it was given
#[derive(Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<Result<String>>>,
    pub prompts: RefCell<Vec<PromptPayload>>,
    pub max_tokens: Cell<Option<u32>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Model answering from a mixed script of replies and failures
    pub fn from_results(results: Vec<Result<String>>) -> Self {
        Self {
            replies: RefCell::new(results.into()),
            ..Self::default()
        }
    }

    /// Model whose first `times` calls fail
    pub fn failing(times: usize) -> Self {
        Self {
            replies: RefCell::new(
                (0..times)
                    .map(|_| Err(Error::Llm("connection refused".to_string())))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

#[async_trait(?Send)]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &PromptPayload, max_tokens: u32) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.clone());
        self.max_tokens.set(Some(max_tokens));
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok("Okay.".to_string()))
    }
}

/// Model that simulates Ctrl-C arriving mid-generation
pub struct CancellingModel {
    pub cancel: CancellationToken,
}

#[async_trait(?Send)]
impl ModelClient for CancellingModel {
    async fn generate(&self, _prompt: &PromptPayload, _max_tokens: u32) -> Result<String> {
        self.cancel.cancel();
        std::future::pending().await
    }
}

/// Records everything spoken
#[derive(Default)]
pub struct RecordingSpeaker {
    pub spoken: RefCell<Vec<String>>,
    pub fail: Cell<bool>,
    cancel_on: RefCell<Option<(usize, CancellationToken)>>,
}

impl RecordingSpeaker {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.borrow().clone()
    }

    /// Simulate Ctrl-C while the `nth` utterance (1-based) is playing
    pub fn cancel_on(&self, nth: usize, cancel: CancellationToken) {
        *self.cancel_on.borrow_mut() = Some((nth, cancel));
    }
}

#[async_trait(?Send)]
impl SpeechSynthesizer for RecordingSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.borrow_mut().push(text.to_string());
        let count = self.spoken.borrow().len();
        let cancel = self
            .cancel_on
            .borrow()
            .as_ref()
            .filter(|(nth, _)| *nth == count)
            .map(|(_, cancel)| cancel.clone());
        if let Some(cancel) = cancel {
            cancel.cancel();
            return std::future::pending().await;
        }
        if self.fail.get() {
            return Err(Error::Tts("speaker offline".to_string()));
        }
        Ok(())
    }
}

/// Keeps every logged turn in memory
#[derive(Default)]
pub struct RecordingLog {
    pub records: RefCell<Vec<TurnRecord>>,
}

impl RecordingLog {
    pub fn records(&self) -> Vec<TurnRecord> {
        self.records.borrow().clone()
    }
}

impl TurnLog for RecordingLog {
    fn log_turn(&self, record: &TurnRecord) -> Result<()> {
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }
}

/// One set of fakes for a test
pub struct Harness<M: ModelClient = ScriptedModel> {
    pub cancel: CancellationToken,
    pub wake: ScriptedWake,
    pub voice: ScriptedVoice,
    pub transcriber: ScriptedTranscriber,
    pub model: M,
    pub speaker: RecordingSpeaker,
    pub log: RecordingLog,
}

impl Harness<ScriptedModel> {
    /// Fakes for one conversation: voice is heard for every transcript, then
    /// silence ends the conversation
    pub fn new<I, S>(transcripts: I, replies: Vec<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transcripts: Vec<String> = transcripts.into_iter().map(Into::into).collect();
        Self::with_parts(
            ScriptedVoice::new(vec![true; transcripts.len()]),
            ScriptedTranscriber::new(transcripts),
            ScriptedModel::new(replies),
        )
    }
}

impl<M: ModelClient> Harness<M> {
    pub fn with_parts(voice: ScriptedVoice, transcriber: ScriptedTranscriber, model: M) -> Self {
        Self::with_cancel(CancellationToken::new(), voice, transcriber, model)
    }

    /// Like [`Harness::with_parts`], sharing `cancel` with the model
    pub fn with_cancel(
        cancel: CancellationToken,
        voice: ScriptedVoice,
        transcriber: ScriptedTranscriber,
        model: M,
    ) -> Self {
        Self {
            wake: ScriptedWake::new(1, cancel.clone()),
            cancel,
            voice,
            transcriber,
            model,
            speaker: RecordingSpeaker::default(),
            log: RecordingLog::default(),
        }
    }

    pub fn io(&self) -> Collaborators<'_> {
        Collaborators {
            wake: &self.wake,
            voice: &self.voice,
            transcriber: &self.transcriber,
            model: &self.model,
            speaker: &self.speaker,
            log: &self.log,
        }
    }
}
