//! Per-turn state machine
//!
//! One turn walks `AwaitingVoice → Transcribing → CheckingEnding →
//! Generating → Speaking → Done`. Every collaborator failure is contained
//! here: the caller only ever sees a [`TurnReport`].

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::collaborators::{Collaborators, TurnRecord};
use super::ending::EndingDetector;
use super::history::{HistoryStore, Role};
use super::prompt::PromptFormatter;
use super::session::SessionConfig;
use crate::{Error, Result};

/// Spoken when the user stays silent past the awaiting timeout
pub const TIMEOUT_NOTICE: &str = "I didn't hear anything, so I'll go back to sleep.";

/// Spoken when the user asks to end the conversation
pub const FAREWELL: &str = "Goodbye! Talk to you later.";

/// Spoken when the operator interrupts
pub const INTERRUPT_FAREWELL: &str = "Goodbye!";

/// Spoken when the model produced no reply
pub const NO_REPLY_NOTICE: &str = "Sorry, I couldn't generate a response.";

/// Spoken after an unexpected collaborator failure
pub const FAULT_APOLOGY: &str = "Sorry, something went wrong. Let's try that again.";

/// Position of a turn in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingVoice,
    Transcribing,
    CheckingEnding,
    Generating,
    Speaking,
    Done,
}

/// Why a conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// User said an ending phrase
    UserRequested,
    /// No voice activity before the awaiting timeout
    Timeout,
    /// Operator interrupt
    Interrupted,
    /// Too many consecutive faults to continue
    FatalError,
}

impl EndReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRequested => "user_requested",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
            Self::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single turn resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Assistant reply committed and spoken
    Replied,
    /// Model produced nothing; notice spoken, history untouched
    NoReply,
    /// Transcription came back empty; nothing happened
    Abandoned,
    /// A collaborator failed; apology spoken
    Faulted,
    /// The conversation is over
    End(EndReason),
}

/// Result of [`TurnController::run_turn`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// User text committed to history during this turn, if any
    pub utterance: Option<String>,
}

impl TurnReport {
    /// Whether this turn counts toward the conversation's turn count
    #[must_use]
    pub const fn counts(&self) -> bool {
        self.utterance.is_some()
    }

    /// Terminal reason, if the conversation should end
    #[must_use]
    pub const fn end_reason(&self) -> Option<EndReason> {
        match self.outcome {
            TurnOutcome::End(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Why a turn stopped early
#[derive(Debug)]
pub(crate) enum Abort {
    Interrupted,
    Fault(Error),
}

/// Await `fut` unless `cancel` fires first
pub(crate) async fn interruptible<T, F>(
    cancel: &CancellationToken,
    fut: F,
) -> std::result::Result<T, Abort>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Abort::Interrupted),
        result = fut => result.map_err(Abort::Fault),
    }
}

/// Drives one conversation turn against the collaborators
pub struct TurnController<'a> {
    config: &'a SessionConfig,
    detector: EndingDetector,
    formatter: PromptFormatter,
    io: Collaborators<'a>,
}

impl<'a> TurnController<'a> {
    #[must_use]
    pub fn new(config: &'a SessionConfig, io: Collaborators<'a>) -> Self {
        Self {
            config,
            detector: EndingDetector::default(),
            formatter: PromptFormatter::default(),
            io,
        }
    }

    /// Replace the ending detector
    #[must_use]
    pub fn with_detector(mut self, detector: EndingDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the prompt formatter
    #[must_use]
    pub fn with_formatter(mut self, formatter: PromptFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        self.config
    }

    #[must_use]
    pub const fn collaborators(&self) -> Collaborators<'a> {
        self.io
    }

    /// Run one turn, updating `history`
    ///
    /// Never fails: collaborator errors become [`TurnOutcome::Faulted`] and
    /// cancellation becomes `End(Interrupted)`.
    pub async fn run_turn(
        &self,
        history: &mut HistoryStore,
        cancel: &CancellationToken,
    ) -> TurnReport {
        let mut state = TurnState::AwaitingVoice;
        let mut utterance = None;

        let outcome = match self.drive(history, cancel, &mut state, &mut utterance).await {
            Ok(outcome) => outcome,
            Err(Abort::Interrupted) => {
                if state == TurnState::Generating
                    && let Some(text) = &utterance
                {
                    self.record(&TurnRecord::failed(text.as_str(), "interrupted"));
                }
                self.farewell_on_interrupt().await;
                TurnOutcome::End(EndReason::Interrupted)
            }
            Err(Abort::Fault(e)) => self.recover(state, utterance.as_deref(), &e, cancel).await,
        };

        tracing::debug!(?outcome, committed = utterance.is_some(), "turn finished");
        TurnReport { outcome, utterance }
    }

    async fn drive(
        &self,
        history: &mut HistoryStore,
        cancel: &CancellationToken,
        state: &mut TurnState,
        utterance: &mut Option<String>,
    ) -> std::result::Result<TurnOutcome, Abort> {
        let io = self.io;

        enter(state, TurnState::AwaitingVoice);
        let heard = interruptible(
            cancel,
            io.voice.has_voice_activity(
                self.config.awaiting_timeout,
                self.config.vad_energy_threshold,
            ),
        )
        .await?;

        if !heard {
            tracing::info!(
                timeout_secs = self.config.awaiting_timeout.as_secs_f64(),
                "no voice activity before timeout"
            );
            self.say(cancel, TIMEOUT_NOTICE).await?;
            return Ok(TurnOutcome::End(EndReason::Timeout));
        }

        enter(state, TurnState::Transcribing);
        let transcript = interruptible(cancel, io.transcriber.transcribe()).await?;
        let text = transcript.trim();
        if text.is_empty() {
            tracing::debug!("empty transcription, abandoning turn");
            return Ok(TurnOutcome::Abandoned);
        }
        tracing::info!(utterance = %text, "user said");

        enter(state, TurnState::CheckingEnding);
        history.append(Role::User, text);
        *utterance = Some(text.to_string());

        if self.detector.is_ending(text) {
            tracing::info!("ending phrase detected");
            self.record(&TurnRecord::completed(text, FAREWELL));
            self.say(cancel, FAREWELL).await?;
            return Ok(TurnOutcome::End(EndReason::UserRequested));
        }

        enter(state, TurnState::Generating);
        let prompt = self.formatter.format(history, self.config.provider);
        let reply = interruptible(
            cancel,
            io.model.generate(&prompt, self.config.max_response_tokens),
        )
        .await?;
        let reply = reply.trim();

        if reply.is_empty() {
            tracing::warn!("model returned an empty reply");
            self.record(&TurnRecord::failed(text, "empty model response"));
            self.say(cancel, NO_REPLY_NOTICE).await?;
            return Ok(TurnOutcome::NoReply);
        }

        enter(state, TurnState::Speaking);
        tracing::info!(reply = %reply, "assistant replied");
        history.append(Role::Assistant, reply);
        self.record(&TurnRecord::completed(text, reply));
        interruptible(cancel, io.speaker.speak(reply)).await?;

        enter(state, TurnState::Done);
        Ok(TurnOutcome::Replied)
    }

    /// Turn a collaborator failure into a spoken apology
    async fn recover(
        &self,
        state: TurnState,
        utterance: Option<&str>,
        error: &Error,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        tracing::warn!(?state, error = %error, "turn failed");

        // The reply was already logged as completed before playback
        if state != TurnState::Speaking
            && let Some(text) = utterance
        {
            self.record(&TurnRecord::failed(text, error.to_string()));
        }

        match self.say(cancel, FAULT_APOLOGY).await {
            Ok(()) => TurnOutcome::Faulted,
            Err(_) => {
                self.farewell_on_interrupt().await;
                TurnOutcome::End(EndReason::Interrupted)
            }
        }
    }

    /// Speak `text`, tolerating playback failures but not cancellation
    pub(crate) async fn say(
        &self,
        cancel: &CancellationToken,
        text: &str,
    ) -> std::result::Result<(), Abort> {
        match interruptible(cancel, self.io.speaker.speak(text)).await {
            Err(Abort::Fault(e)) => {
                tracing::warn!(error = %e, text, "failed to speak");
                Ok(())
            }
            other => other,
        }
    }

    /// Short goodbye once cancellation has fired
    pub(crate) async fn farewell_on_interrupt(&self) {
        tracing::info!("interrupted, saying goodbye");
        if let Err(e) = self.io.speaker.speak(INTERRUPT_FAREWELL).await {
            tracing::warn!(error = %e, "failed to speak farewell");
        }
    }

    fn record(&self, record: &TurnRecord) {
        if let Err(e) = self.io.log.log_turn(record) {
            tracing::warn!(error = %e, "failed to log turn");
        }
    }
}

fn enter(state: &mut TurnState, next: TurnState) {
    tracing::debug!(from = ?*state, to = ?next, "turn state");
    *state = next;
}
