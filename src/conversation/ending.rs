//! Conversation ending detection

/// Phrases that end a conversation when heard anywhere in an utterance
pub const DEFAULT_ENDING_PHRASES: &[&str] = &[
    "goodbye",
    "bye",
    "see you",
    "that's all",
    "nevermind",
    "stop",
    "quit",
    "exit",
];

/// Classifies whether a user utterance asks to end the conversation
///
/// Matching is case-insensitive substring containment, so "byebye" and
/// "Please stop" both match. This also means "nonstop" counts as an ending.
#[derive(Debug, Clone)]
pub struct EndingDetector {
    phrases: Vec<String>,
}

impl EndingDetector {
    /// Create a detector from a custom phrase list
    ///
    /// Phrases are trimmed and lowercased; blank entries are dropped.
    #[must_use]
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        tracing::debug!(phrases = ?phrases, "ending detector initialized");

        Self { phrases }
    }

    /// Check whether `text` contains any ending phrase
    #[must_use]
    pub fn is_ending(&self, text: &str) -> bool {
        let normalized = text.to_lowercase();
        self.phrases.iter().any(|p| normalized.contains(p.as_str()))
    }

    /// Configured phrases after normalization
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for EndingDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ENDING_PHRASES)
    }
}
