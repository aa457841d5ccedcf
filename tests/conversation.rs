//! Conversation engine integration tests
//!
//! Drives the session loop and turn controller against scripted
//! collaborators; no audio hardware or network needed.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vigil::conversation::{
    EndingDetector, FAREWELL, FATAL_NOTICE, FAULT_APOLOGY, GREETING, HistoryStore,
    INTERRUPT_FAREWELL, NO_REPLY_NOTICE, PromptFormatter, PromptPayload, Provider, Role,
    SYSTEM_PREAMBLE, SessionConfig, SessionLoop, SessionState, TIMEOUT_NOTICE, TurnController,
    TurnOutcome, TurnStatus,
};
use vigil::{EndReason, Error};

mod common;

use common::{
    CancellingModel, Harness, ScriptedModel, ScriptedTranscriber, ScriptedVoice, ScriptedWake,
    test_config,
};

fn contents(history: &HistoryStore) -> Vec<(Role, String)> {
    history
        .iter()
        .map(|t| (t.role, t.content.clone()))
        .collect()
}

// ============================================================================
// History bound
// ============================================================================

#[test]
fn test_history_keeps_most_recent_exchanges() {
    let mut history = HistoryStore::new(10);
    for i in 0..15 {
        history.append(Role::User, format!("question {i}"));
        history.append(Role::Assistant, format!("answer {i}"));
    }

    assert_eq!(history.len(), 20);
    let oldest = history.iter().next().unwrap();
    assert_eq!(oldest.role, Role::User);
    assert_eq!(oldest.content, "question 5");
}

#[tokio::test]
async fn test_session_history_is_bounded() {
    let config = SessionConfig {
        max_history_turns: 2,
        ..test_config()
    };
    let h = Harness::new(["one", "two", "three"], vec!["a1", "a2", "a3"]);
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Timeout);
    assert_eq!(outcome.turn_count, 3);
    assert_eq!(
        contents(session.history()),
        vec![
            (Role::User, "two".to_string()),
            (Role::Assistant, "a2".to_string()),
            (Role::User, "three".to_string()),
            (Role::Assistant, "a3".to_string()),
        ]
    );
}

// ============================================================================
// Turn outcomes
// ============================================================================

#[tokio::test]
async fn test_silence_ends_with_timeout() {
    let config = test_config();
    let h = Harness::with_parts(
        ScriptedVoice::new([false]),
        ScriptedTranscriber::new(["should never be read"]),
        ScriptedModel::default(),
    );
    let controller = TurnController::new(&config, h.io());
    let mut history = HistoryStore::new(config.max_history_turns);

    let report = controller.run_turn(&mut history, &h.cancel).await;

    assert_eq!(report.outcome, TurnOutcome::End(EndReason::Timeout));
    assert!(!report.counts());
    assert_eq!(h.transcriber.calls.get(), 0);
    assert_eq!(h.model.calls(), 0);
    assert!(history.is_empty());
    assert_eq!(h.speaker.spoken(), vec![TIMEOUT_NOTICE]);
}

#[tokio::test]
async fn test_vad_receives_configured_limits() {
    let config = SessionConfig {
        awaiting_timeout: Duration::from_millis(75),
        vad_energy_threshold: 900,
        max_response_tokens: 42,
        ..SessionConfig::default()
    };
    let h = Harness::new(["hello"], vec!["Hi."]);
    let controller = TurnController::new(&config, h.io());
    let mut history = HistoryStore::new(config.max_history_turns);

    controller.run_turn(&mut history, &h.cancel).await;

    assert_eq!(h.voice.last_timeout.get(), Some(Duration::from_millis(75)));
    assert_eq!(h.voice.last_threshold.get(), Some(900));
    assert_eq!(h.model.max_tokens.get(), Some(42));
}

#[tokio::test]
async fn test_goodbye_ends_without_model_call() {
    let config = test_config();
    let h = Harness::new(["Goodbye"], vec![]);
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::UserRequested);
    assert_eq!(outcome.turn_count, 1);
    assert_eq!(h.model.calls(), 0);
    assert_eq!(session.history().last_user_utterance(), Some("Goodbye"));
    assert_eq!(h.speaker.spoken(), vec![GREETING, FAREWELL]);

    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_input, "Goodbye");
    assert_eq!(records[0].status, TurnStatus::Completed);
}

#[tokio::test]
async fn test_empty_reply_apologizes_and_continues() {
    let config = test_config();
    let h = Harness::new(
        ["what's the weather", "thanks"],
        vec!["", "You're welcome."],
    );
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Timeout);
    assert_eq!(outcome.turn_count, 2);
    assert_eq!(h.model.calls(), 2);
    assert_eq!(
        contents(session.history()),
        vec![
            (Role::Assistant, GREETING.to_string()),
            (Role::User, "what's the weather".to_string()),
            (Role::User, "thanks".to_string()),
            (Role::Assistant, "You're welcome.".to_string()),
        ]
    );
    assert_eq!(
        h.speaker.spoken(),
        vec![GREETING, NO_REPLY_NOTICE, "You're welcome.", TIMEOUT_NOTICE]
    );

    let records = h.log.records();
    assert_eq!(records[0].status, TurnStatus::Failed);
    assert_eq!(records[0].error_message.as_deref(), Some("empty model response"));
    assert_eq!(records[1].status, TurnStatus::Completed);
}

#[tokio::test]
async fn test_blank_transcripts_are_abandoned() {
    let config = test_config();
    let h = Harness::new(["", "   ", "hello"], vec!["Hi there."]);
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Timeout);
    assert_eq!(outcome.turn_count, 1);
    assert_eq!(h.transcriber.calls.get(), 3);
    assert_eq!(h.model.calls(), 1);
    assert_eq!(h.log.records().len(), 1);
}

#[tokio::test]
async fn test_nonstop_is_treated_as_ending() {
    let config = test_config();
    let h = Harness::new(["play music nonstop"], vec![]);
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::UserRequested);
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_custom_ending_phrases() {
    let config = test_config();
    let h = Harness::new(["goodbye", "over and out"], vec!["Goodbye to you too?"]);
    let mut session = SessionLoop::new(&config, h.io())
        .with_detector(EndingDetector::new(["over and out"]));

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::UserRequested);
    assert_eq!(outcome.turn_count, 2);
    assert_eq!(h.model.calls(), 1);
}

// ============================================================================
// Prompt shapes
// ============================================================================

#[tokio::test]
async fn test_text_prompt_contains_history() {
    let config = test_config();
    let h = Harness::new(["what's up"], vec!["Not much."]);
    let mut session = SessionLoop::new(&config, h.io());

    session.converse(&h.cancel).await;

    let prompts = h.model.prompts.borrow();
    let PromptPayload::Text(text) = &prompts[0] else {
        panic!("expected a text prompt");
    };
    assert!(text.starts_with(SYSTEM_PREAMBLE));
    assert!(text.ends_with("Assistant: Hi! How can I help you?\nUser: what's up\nAssistant:"));
}

#[tokio::test]
async fn test_chat_prompt_starts_with_system() {
    let config = SessionConfig {
        provider: Provider::ChatMessages,
        ..test_config()
    };
    let h = Harness::new(["what's up"], vec!["Not much."]);
    let mut session = SessionLoop::new(&config, h.io());

    session.converse(&h.cancel).await;

    let prompts = h.model.prompts.borrow();
    let PromptPayload::Messages(messages) = &prompts[0] else {
        panic!("expected a message prompt");
    };
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].content, GREETING);
    assert_eq!(messages[2].content, "what's up");
}

#[test]
fn test_unknown_provider_rejected() {
    let history = HistoryStore::new(10);
    let result = PromptFormatter::default().format_named(&history, "foo");
    assert!(matches!(result, Err(Error::Config(_))));
}

// ============================================================================
// Faults
// ============================================================================

#[tokio::test]
async fn test_consecutive_faults_end_session() {
    let config = test_config();
    let h = Harness::with_parts(
        ScriptedVoice::new([true; 5]),
        ScriptedTranscriber::new(["a", "b", "c", "d", "e"]),
        ScriptedModel::failing(5),
    );
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::FatalError);
    assert_eq!(outcome.turn_count, 3);
    assert_eq!(h.model.calls(), 3);
    assert_eq!(
        h.speaker.spoken(),
        vec![GREETING, FAULT_APOLOGY, FAULT_APOLOGY, FAULT_APOLOGY, FATAL_NOTICE]
    );

    let records = h.log.records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == TurnStatus::Failed));
    assert!(
        records[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("connection refused"))
    );
}

#[tokio::test]
async fn test_successful_turn_resets_fault_count() {
    let config = SessionConfig {
        max_consecutive_faults: 2,
        ..test_config()
    };
    let llm_down = || Err(Error::Llm("timeout".to_string()));
    let h = Harness::with_parts(
        ScriptedVoice::new([true; 4]),
        ScriptedTranscriber::new(["a", "b", "c", "d"]),
        ScriptedModel::from_results(vec![
            llm_down(),
            Ok("fine".to_string()),
            llm_down(),
            Ok("fine again".to_string()),
        ]),
    );
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Timeout);
    assert_eq!(outcome.turn_count, 4);
}

#[tokio::test]
async fn test_transcription_failure_is_not_counted() {
    let config = test_config();
    let h = Harness::with_parts(
        ScriptedVoice::new([true]),
        ScriptedTranscriber::new(Vec::<String>::new()).then_fail(Error::Stt("503".to_string())),
        ScriptedModel::default(),
    );
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Timeout);
    assert_eq!(outcome.turn_count, 0);
    assert!(h.log.records().is_empty());
    assert_eq!(
        h.speaker.spoken(),
        vec![GREETING, FAULT_APOLOGY, TIMEOUT_NOTICE]
    );
}

#[tokio::test]
async fn test_playback_failure_keeps_reply_logged_once() {
    let config = test_config();
    let h = Harness::new(["hello"], vec!["Hi!"]);
    h.speaker.fail.set(true);
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Timeout);
    assert_eq!(session.history().len(), 3);

    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TurnStatus::Completed);
}

// ============================================================================
// Interrupts and the outer loop
// ============================================================================

#[tokio::test]
async fn test_interrupt_during_generation() {
    let config = test_config();
    let cancel = CancellationToken::new();
    let h = Harness::with_cancel(
        cancel.clone(),
        ScriptedVoice::new([true]),
        ScriptedTranscriber::new(["tell me a story"]),
        CancellingModel { cancel },
    );
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Interrupted);
    assert_eq!(outcome.turn_count, 1);
    assert_eq!(
        contents(session.history()),
        vec![
            (Role::Assistant, GREETING.to_string()),
            (Role::User, "tell me a story".to_string()),
        ]
    );
    assert_eq!(h.speaker.spoken().last().map(String::as_str), Some(INTERRUPT_FAREWELL));

    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_message.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn test_interrupt_while_awaiting_voice() {
    let config = test_config();
    let cancel = CancellationToken::new();
    let h = Harness::with_cancel(
        cancel.clone(),
        ScriptedVoice::cancelling(cancel),
        ScriptedTranscriber::default(),
        ScriptedModel::default(),
    );
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Interrupted);
    assert_eq!(outcome.turn_count, 0);
    assert_eq!(
        contents(session.history()),
        vec![(Role::Assistant, GREETING.to_string())]
    );
    assert!(h.log.records().is_empty());
    assert_eq!(h.speaker.spoken(), vec![GREETING, INTERRUPT_FAREWELL]);
    assert_eq!(h.transcriber.calls.get(), 0);
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_interrupt_during_transcription() {
    let config = test_config();
    let cancel = CancellationToken::new();
    let h = Harness::with_cancel(
        cancel.clone(),
        ScriptedVoice::new([true]),
        ScriptedTranscriber::cancelling(cancel),
        ScriptedModel::default(),
    );
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Interrupted);
    assert_eq!(outcome.turn_count, 0);
    assert_eq!(
        contents(session.history()),
        vec![(Role::Assistant, GREETING.to_string())]
    );
    assert!(h.log.records().is_empty());
    assert_eq!(h.speaker.spoken(), vec![GREETING, INTERRUPT_FAREWELL]);
    assert_eq!(h.transcriber.calls.get(), 1);
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_interrupt_during_reply_playback() {
    let config = test_config();
    let h = Harness::new(["what time is it"], vec!["It is noon."]);
    // Greeting is the first utterance, the reply the second
    h.speaker.cancel_on(2, h.cancel.clone());
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Interrupted);
    assert_eq!(outcome.turn_count, 1);
    assert_eq!(
        contents(session.history()),
        vec![
            (Role::Assistant, GREETING.to_string()),
            (Role::User, "what time is it".to_string()),
            (Role::Assistant, "It is noon.".to_string()),
        ]
    );

    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TurnStatus::Completed);
    assert_eq!(records[0].assistant_response.as_deref(), Some("It is noon."));
    assert_eq!(
        h.speaker.spoken(),
        vec![GREETING, "It is noon.", INTERRUPT_FAREWELL]
    );
}

#[tokio::test]
async fn test_interrupt_during_greeting() {
    let config = test_config();
    let h = Harness::new(["hello"], vec!["Hi!"]);
    h.speaker.cancel_on(1, h.cancel.clone());
    let mut session = SessionLoop::new(&config, h.io());

    let outcome = session.converse(&h.cancel).await;

    assert_eq!(outcome.end_reason, EndReason::Interrupted);
    assert_eq!(outcome.turn_count, 0);
    assert!(session.history().is_empty());
    assert!(h.log.records().is_empty());
    assert_eq!(h.speaker.spoken(), vec![GREETING, INTERRUPT_FAREWELL]);
    assert_eq!(h.voice.calls.get(), 0);
}

#[tokio::test]
async fn test_run_stops_after_interrupted_conversation() {
    let config = test_config();
    let cancel = CancellationToken::new();
    let h = Harness::with_cancel(
        cancel.clone(),
        ScriptedVoice::cancelling(cancel),
        ScriptedTranscriber::default(),
        ScriptedModel::default(),
    );
    let mut session = SessionLoop::new(&config, h.io());

    session.run(&h.cancel).await.unwrap();

    assert_eq!(h.wake.calls.get(), 1);
    assert_eq!(session.conversations(), 1);
    let last = session.last_outcome().unwrap();
    assert_eq!(last.end_reason, EndReason::Interrupted);
    assert_eq!(last.turn_count, 0);
}

#[tokio::test]
async fn test_run_stops_when_cancelled() {
    let config = test_config();
    let h = Harness::new(["hello"], vec!["Hi there."]);
    let mut session = SessionLoop::new(&config, h.io());

    session.run(&h.cancel).await.unwrap();

    // One conversation, then the wake fake cancels on its second call
    assert_eq!(h.wake.calls.get(), 2);
    assert_eq!(session.conversations(), 1);
    assert_eq!(session.state(), SessionState::WaitingForWake);
    let last = session.last_outcome().unwrap();
    assert_eq!(last.end_reason, EndReason::Timeout);
    assert_eq!(last.turn_count, 1);
}

#[tokio::test]
async fn test_run_returns_immediately_if_already_cancelled() {
    let config = test_config();
    let h = Harness::new(["hello"], vec![]);
    h.cancel.cancel();
    let mut session = SessionLoop::new(&config, h.io());

    session.run(&h.cancel).await.unwrap();

    assert_eq!(h.wake.calls.get(), 0);
    assert_eq!(session.conversations(), 0);
}

#[tokio::test]
async fn test_wake_failure_is_fatal() {
    let config = test_config();
    let mut h = Harness::new(["hello"], vec![]);
    h.wake = ScriptedWake::failing(h.cancel.clone());
    let mut session = SessionLoop::new(&config, h.io());

    let result = session.run(&h.cancel).await;

    assert!(matches!(result, Err(Error::WakeWord(_))));
    assert_eq!(session.conversations(), 0);
}

#[tokio::test]
async fn test_history_cleared_between_conversations() {
    let config = test_config();
    let mut h = Harness::with_parts(
        ScriptedVoice::new([true, false, true, false]),
        ScriptedTranscriber::new(["first question", "second question"]),
        ScriptedModel::default(),
    );
    h.wake = ScriptedWake::new(2, h.cancel.clone());
    let mut session = SessionLoop::new(&config, h.io());

    session.run(&h.cancel).await.unwrap();

    assert_eq!(session.conversations(), 2);
    assert_eq!(
        contents(session.history()),
        vec![
            (Role::Assistant, GREETING.to_string()),
            (Role::User, "second question".to_string()),
            (Role::Assistant, "Okay.".to_string()),
        ]
    );

    // The second prompt never saw the first conversation
    let prompts = h.model.prompts.borrow();
    let PromptPayload::Text(second) = &prompts[1] else {
        panic!("expected a text prompt");
    };
    assert!(!second.contains("first question"));
}
