//! Turn-taking conversation engine
//!
//! The engine owns no I/O. Wake detection, voice activity, transcription,
//! generation, speech and persistence are reached through the traits in
//! [`collaborators`], so the whole protocol runs against scripted fakes in
//! tests and against real audio/HTTP adapters in the daemon.

pub mod collaborators;
mod ending;
mod history;
mod prompt;
mod session;
mod turn;

pub use collaborators::{
    Collaborators, ModelClient, NullLog, SpeechSynthesizer, Transcriber, TurnLog, TurnRecord,
    TurnStatus, VoiceActivityProbe, WakeTrigger,
};
pub use ending::{DEFAULT_ENDING_PHRASES, EndingDetector};
pub use history::{HistoryStore, Role, Turn};
pub use prompt::{ASSISTANT_CUE, PromptFormatter, PromptPayload, Provider, SYSTEM_PREAMBLE};
pub use session::{
    ConversationOutcome, FATAL_NOTICE, GREETING, MAX_AWAITING_TIMEOUT, SessionConfig, SessionLoop,
    SessionState,
};
pub use turn::{
    EndReason, FAREWELL, FAULT_APOLOGY, INTERRUPT_FAREWELL, NO_REPLY_NOTICE, TIMEOUT_NOTICE,
    TurnController, TurnOutcome, TurnReport, TurnState,
};
