//! TOML configuration file loading
//!
//! Supports `~/.config/vigil/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VigilConfigFile {
    /// Conversation tuning
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Conversation log configuration
    #[serde(default)]
    pub logging: LoggingFileConfig,
}

/// Conversation tuning
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    pub max_history_turns: Option<usize>,

    /// Seconds to wait for the user to start speaking
    pub awaiting_timeout: Option<f64>,

    pub vad_energy_threshold: Option<u32>,

    pub max_response_tokens: Option<u32>,

    pub max_consecutive_faults: Option<u32>,

    /// Phrases that end the conversation
    pub ending_phrases: Option<Vec<String>>,
}

/// Language model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Provider name ("ollama", "openai", "chat", ...)
    pub provider: Option<String>,

    /// Model identifier (e.g. "granite3.2:2b")
    pub model: Option<String>,

    /// Endpoint URL
    pub url: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Wake words (any one triggers)
    pub wake_words: Option<Vec<String>>,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Conversation log configuration
#[derive(Debug, Default, Deserialize)]
pub struct LoggingFileConfig {
    pub enabled: Option<bool>,
    pub db_path: Option<String>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed or has unknown keys
pub fn parse_config_file(content: &str) -> Result<VigilConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `VigilConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VigilConfigFile {
    let Some(path) = config_file_path() else {
        return VigilConfigFile::default();
    };

    if !path.exists() {
        return VigilConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VigilConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VigilConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/vigil/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("vigil").join("config.toml"))
}
