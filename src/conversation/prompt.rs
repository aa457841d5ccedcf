//! Prompt formatting for language model providers
//!
//! Renders the conversation history into the payload shape a provider
//! expects: a single text prompt for Ollama's generate endpoint, or a message
//! list for chat-completion style APIs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::history::{HistoryStore, Turn};
use crate::{Error, Result};

/// System instruction prepended to every prompt
pub const SYSTEM_PREAMBLE: &str =
    "You are a helpful voice assistant. Keep responses brief (1-2 sentences).";

/// Cue that ends a text prompt so the model continues as the assistant
pub const ASSISTANT_CUE: &str = "Assistant:";

/// Payload shape expected by a model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Single text blob (Ollama `/api/generate`)
    OllamaText,
    /// Ordered message list (OpenAI/Anthropic style chat APIs)
    ChatMessages,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OllamaText => "ollama-text",
            Self::ChatMessages => "chat-messages",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "ollama-text" => Ok(Self::OllamaText),
            "openai" | "anthropic" | "chat" | "chat-messages" => Ok(Self::ChatMessages),
            other => Err(Error::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// Rendered prompt ready to hand to a model client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPayload {
    Text(String),
    Messages(Vec<Turn>),
}

impl PromptPayload {
    /// Provider shape this payload was rendered for
    #[must_use]
    pub const fn provider(&self) -> Provider {
        match self {
            Self::Text(_) => Provider::OllamaText,
            Self::Messages(_) => Provider::ChatMessages,
        }
    }
}

/// Renders history into provider payloads
#[derive(Debug, Clone)]
pub struct PromptFormatter {
    preamble: String,
}

impl PromptFormatter {
    #[must_use]
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
        }
    }

    /// Render `history` for `provider`
    #[must_use]
    pub fn format(&self, history: &HistoryStore, provider: Provider) -> PromptPayload {
        match provider {
            Provider::OllamaText => {
                let mut prompt = format!("{}\n\n", self.preamble);
                for turn in history.iter() {
                    prompt.push_str(turn.role.label());
                    prompt.push_str(": ");
                    prompt.push_str(&turn.content);
                    prompt.push('\n');
                }
                prompt.push_str(ASSISTANT_CUE);
                PromptPayload::Text(prompt)
            }
            Provider::ChatMessages => {
                let mut messages = Vec::with_capacity(history.len() + 1);
                messages.push(Turn::system(self.preamble.clone()));
                messages.extend(history.iter().cloned());
                PromptPayload::Messages(messages)
            }
        }
    }

    /// Render `history` for a provider given by name
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider name is unknown
    pub fn format_named(&self, history: &HistoryStore, provider: &str) -> Result<PromptPayload> {
        let provider = provider.parse::<Provider>()?;
        Ok(self.format(history, provider))
    }

    #[must_use]
    pub fn preamble(&self) -> &str {
        &self.preamble
    }
}

impl Default for PromptFormatter {
    fn default() -> Self {
        Self::new(SYSTEM_PREAMBLE)
    }
}
