//! Vigil - wake-word voice assistant
//!
//! This library provides the core functionality for Vigil:
//! - A turn-taking conversation engine with bounded history
//! - Voice adapters (capture, energy VAD, wake word, STT, TTS, playback)
//! - Language model clients (Ollama generate, OpenAI-compatible chat)
//! - A `SQLite` conversation log
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Daemon / CLI                        │
//! │   config  │  Ctrl-C → CancellationToken  │  logs     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Conversation engine                     │
//! │   SessionLoop → TurnController → History/Prompt     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ collaborator traits
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Adapters                           │
//! │   Wake  │  VAD  │  STT  │  LLM  │  TTS  │  SQLite    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod daemon;
pub mod db;
pub mod error;
pub mod llm;
pub mod voice;

pub use config::Config;
pub use conversation::{
    ConversationOutcome, EndReason, HistoryStore, PromptFormatter, PromptPayload, Provider,
    SessionConfig, SessionLoop, TurnController, TurnOutcome,
};
pub use daemon::Daemon;
pub use db::{ConversationLog, DbConn, DbPool};
pub use error::{Error, Result};
