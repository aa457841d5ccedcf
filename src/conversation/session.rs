//! Session loop
//!
//! Waits for the wake trigger, greets the user, then runs turns until one of
//! them ends the conversation. History is cleared at the start of every
//! conversation so nothing leaks between wake events.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::collaborators::{Collaborators, WakeTrigger};
use super::ending::EndingDetector;
use super::history::{HistoryStore, Role};
use super::prompt::Provider;
use super::turn::{Abort, EndReason, TurnController, TurnOutcome, interruptible};
use crate::{Error, Result};

/// Spoken and recorded as the first assistant turn of every conversation
pub const GREETING: &str = "Hi! How can I help you?";

/// Spoken when the conversation is abandoned after repeated faults
pub const FATAL_NOTICE: &str = "I'm having trouble right now. Let's talk later.";

/// Longest allowed wait for the user to start speaking
pub const MAX_AWAITING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Conversation tuning resolved once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Exchanges kept in history (one user + one assistant message each)
    pub max_history_turns: usize,
    /// How long to wait for the user to start speaking
    pub awaiting_timeout: Duration,
    /// RMS energy (16-bit scale) that counts as voice
    pub vad_energy_threshold: u32,
    /// Token budget for each model reply
    pub max_response_tokens: u32,
    /// Prompt shape expected by the model backend
    pub provider: Provider,
    /// Consecutive faulted turns after which the conversation is abandoned
    pub max_consecutive_faults: u32,
}

impl SessionConfig {
    /// Check every field is positive
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.max_history_turns == 0 {
            return Err(Error::Config("max_history_turns must be > 0".to_string()));
        }
        if self.awaiting_timeout.is_zero() {
            return Err(Error::Config("awaiting_timeout must be > 0".to_string()));
        }
        if self.awaiting_timeout > MAX_AWAITING_TIMEOUT {
            return Err(Error::Config(format!(
                "awaiting_timeout must be at most {}s",
                MAX_AWAITING_TIMEOUT.as_secs()
            )));
        }
        if self.vad_energy_threshold == 0 {
            return Err(Error::Config(
                "vad_energy_threshold must be > 0".to_string(),
            ));
        }
        if self.max_response_tokens == 0 {
            return Err(Error::Config(
                "max_response_tokens must be > 0".to_string(),
            ));
        }
        if self.max_consecutive_faults == 0 {
            return Err(Error::Config(
                "max_consecutive_faults must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 10,
            awaiting_timeout: Duration::from_secs(5),
            vad_energy_threshold: 500,
            max_response_tokens: 150,
            provider: Provider::OllamaText,
            max_consecutive_faults: 3,
        }
    }
}

/// Position of the outer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    WaitingForWake,
    Greeting,
    Conversing,
    Ended,
}

/// Summary of one wake-to-end conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationOutcome {
    pub turn_count: u32,
    pub end_reason: EndReason,
}

/// Outer wake → converse → wait state machine
pub struct SessionLoop<'a> {
    turns: TurnController<'a>,
    wake: &'a dyn WakeTrigger,
    history: HistoryStore,
    state: SessionState,
    last_outcome: Option<ConversationOutcome>,
    conversations: u64,
}

impl<'a> SessionLoop<'a> {
    #[must_use]
    pub fn new(config: &'a SessionConfig, io: Collaborators<'a>) -> Self {
        Self::with_controller(TurnController::new(config, io))
    }

    /// Build a loop around a preconfigured turn controller
    #[must_use]
    pub fn with_controller(turns: TurnController<'a>) -> Self {
        let wake = turns.collaborators().wake;
        let history = HistoryStore::new(turns.config().max_history_turns);
        Self {
            turns,
            wake,
            history,
            state: SessionState::WaitingForWake,
            last_outcome: None,
            conversations: 0,
        }
    }

    /// Replace the ending detector used by every turn
    #[must_use]
    pub fn with_detector(mut self, detector: EndingDetector) -> Self {
        self.turns = self.turns.with_detector(detector);
        self
    }

    /// Run conversations until cancelled
    ///
    /// # Errors
    ///
    /// Returns error if the wake trigger fails; the loop cannot continue
    /// without it
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        tracing::info!("session loop started");

        loop {
            self.enter(SessionState::WaitingForWake);
            match interruptible(cancel, self.wake.wait_for_wake()).await {
                Ok(()) => {}
                Err(Abort::Interrupted) => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
                Err(Abort::Fault(e)) => {
                    tracing::error!(error = %e, "wake trigger failed");
                    return Err(e);
                }
            }

            tracing::info!("wake word detected");
            let outcome = self.converse(cancel).await;

            if outcome.end_reason == EndReason::Interrupted || cancel.is_cancelled() {
                tracing::info!("shutdown requested");
                return Ok(());
            }
        }
    }

    /// Run a single conversation, as if the wake trigger had just fired
    pub async fn converse(&mut self, cancel: &CancellationToken) -> ConversationOutcome {
        self.enter(SessionState::Greeting);
        self.history.clear();

        match self.turns.say(cancel, GREETING).await {
            Ok(()) => self.history.append(Role::Assistant, GREETING),
            Err(_) => {
                self.turns.farewell_on_interrupt().await;
                return self.finish(0, EndReason::Interrupted);
            }
        }

        self.enter(SessionState::Conversing);
        let max_faults = self.turns.config().max_consecutive_faults;
        let mut turn_count = 0u32;
        let mut consecutive_faults = 0u32;

        let reason = loop {
            let report = self.turns.run_turn(&mut self.history, cancel).await;
            if report.counts() {
                turn_count += 1;
            }

            match report.outcome {
                TurnOutcome::End(reason) => break reason,
                TurnOutcome::Faulted => {
                    consecutive_faults += 1;
                    if consecutive_faults >= max_faults {
                        tracing::error!(consecutive_faults, "too many failed turns");
                        if self.turns.say(cancel, FATAL_NOTICE).await.is_err() {
                            self.turns.farewell_on_interrupt().await;
                            break EndReason::Interrupted;
                        }
                        break EndReason::FatalError;
                    }
                }
                TurnOutcome::Replied | TurnOutcome::NoReply => consecutive_faults = 0,
                TurnOutcome::Abandoned => {}
            }
        };

        self.finish(turn_count, reason)
    }

    fn finish(&mut self, turn_count: u32, end_reason: EndReason) -> ConversationOutcome {
        self.enter(SessionState::Ended);
        let outcome = ConversationOutcome {
            turn_count,
            end_reason,
        };
        self.conversations += 1;
        self.last_outcome = Some(outcome);

        tracing::info!(
            turn_count,
            reason = %end_reason,
            conversations = self.conversations,
            "conversation ended"
        );
        outcome
    }

    fn enter(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// History of the current (or most recent) conversation
    #[must_use]
    pub const fn history(&self) -> &HistoryStore {
        &self.history
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn last_outcome(&self) -> Option<ConversationOutcome> {
        self.last_outcome
    }

    /// Number of conversations completed since the loop started
    #[must_use]
    pub const fn conversations(&self) -> u64 {
        self.conversations
    }
}
