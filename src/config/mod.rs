//! Configuration management for Vigil
//!
//! Values resolve as env > toml > default. Blank environment values count as
//! unset.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::conversation::{
    DEFAULT_ENDING_PHRASES, MAX_AWAITING_TIMEOUT, Provider, SessionConfig,
};
use crate::voice::{SttBackend, TtsBackend};
use crate::{Error, Result};

use file::VigilConfigFile;

/// Default Ollama generate endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";

/// Default OpenAI-compatible chat endpoint
pub const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default local model
pub const DEFAULT_OLLAMA_MODEL: &str = "granite3.2:2b";

/// Default hosted chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default wake word
pub const DEFAULT_WAKE_WORD: &str = "jarvis";

/// Vigil configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Conversation tuning handed to the session loop
    pub session: SessionConfig,

    /// Language model endpoint
    pub llm: LlmConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Conversation log
    pub logging: LoggingConfig,

    /// Phrases that end the conversation
    pub ending_phrases: Vec<String>,

    /// Path to data directory (database)
    pub data_dir: PathBuf,
}

/// Language model endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// Endpoint URL
    pub url: String,
}

/// Voice processing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    /// Wake words (any one triggers)
    pub wake_words: Vec<String>,

    pub stt_provider: SttBackend,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub tts_provider: TtsBackend,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper, TTS, chat)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

/// Conversation log configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub db_path: PathBuf,
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any value is invalid
    pub fn resolve<F>(fc: VigilConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = SessionConfig::default();
        let conv = fc.conversation;

        let provider = match env("VIGIL_LLM_PROVIDER").or(fc.llm.provider) {
            Some(name) => Provider::from_str(&name)?,
            None => defaults.provider,
        };

        let awaiting_timeout = match parse_env::<f64>(&env, "VIGIL_AWAITING_TIMEOUT")?
            .or(conv.awaiting_timeout)
        {
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|d| *d <= MAX_AWAITING_TIMEOUT)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "awaiting_timeout must be at most {} seconds, got {secs}",
                        MAX_AWAITING_TIMEOUT.as_secs()
                    ))
                })?,
            Some(secs) => {
                return Err(Error::Config(format!(
                    "awaiting_timeout must be > 0, got {secs}"
                )));
            }
            None => defaults.awaiting_timeout,
        };

        let session = SessionConfig {
            max_history_turns: parse_env(&env, "VIGIL_MAX_HISTORY_TURNS")?
                .or(conv.max_history_turns)
                .unwrap_or(defaults.max_history_turns),
            awaiting_timeout,
            vad_energy_threshold: parse_env(&env, "VIGIL_VAD_ENERGY_THRESHOLD")?
                .or(conv.vad_energy_threshold)
                .unwrap_or(defaults.vad_energy_threshold),
            max_response_tokens: parse_env(&env, "VIGIL_MAX_RESPONSE_TOKENS")?
                .or(conv.max_response_tokens)
                .unwrap_or(defaults.max_response_tokens),
            provider,
            max_consecutive_faults: parse_env(&env, "VIGIL_MAX_CONSECUTIVE_FAULTS")?
                .or(conv.max_consecutive_faults)
                .unwrap_or(defaults.max_consecutive_faults),
        };
        session.validate()?;

        let (default_model, default_url) = match provider {
            Provider::OllamaText => (DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL),
            Provider::ChatMessages => (DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL),
        };
        let llm = LlmConfig {
            model: env("VIGIL_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| default_model.to_string()),
            url: env("VIGIL_LLM_URL")
                .or(fc.llm.url)
                .unwrap_or_else(|| default_url.to_string()),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        let voice = resolve_voice(&env, fc.voice)?;

        let ending_phrases = env("VIGIL_ENDING_PHRASES")
            .map(|v| split_list(&v))
            .or(conv.ending_phrases)
            .filter(|phrases| phrases.iter().any(|p| !p.trim().is_empty()))
            .unwrap_or_else(|| {
                DEFAULT_ENDING_PHRASES
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            });

        // ~/.local/share/vigil on Linux
        let data_dir = directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("vigil"));

        let logging = LoggingConfig {
            enabled: match env("VIGIL_LOGGING_ENABLED") {
                Some(v) => parse_bool("VIGIL_LOGGING_ENABLED", &v)?,
                None => fc.logging.enabled.unwrap_or(true),
            },
            db_path: env("VIGIL_LOGGING_DB_PATH")
                .or(fc.logging.db_path)
                .map_or_else(|| data_dir.join("conversations.db"), PathBuf::from),
        };

        Ok(Self {
            session,
            llm,
            voice,
            api_keys,
            logging,
            ending_phrases,
            data_dir,
        })
    }

    /// API key for the configured STT backend
    #[must_use]
    pub fn stt_api_key(&self) -> Option<&str> {
        match self.voice.stt_provider {
            SttBackend::Whisper => self.api_keys.openai.as_deref(),
            SttBackend::Deepgram => self.api_keys.deepgram.as_deref(),
        }
    }

    /// API key for the configured TTS backend
    #[must_use]
    pub fn tts_api_key(&self) -> Option<&str> {
        match self.voice.tts_provider {
            TtsBackend::OpenAi => self.api_keys.openai.as_deref(),
            TtsBackend::ElevenLabs => self.api_keys.elevenlabs.as_deref(),
        }
    }
}

fn resolve_voice<F>(env: &F, fv: file::VoiceFileConfig) -> Result<VoiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let wake_words = env("VIGIL_WAKE_WORD")
        .map(|v| split_list(&v))
        .or(fv.wake_words)
        .unwrap_or_else(|| vec![DEFAULT_WAKE_WORD.to_string()]);

    let stt_provider = match env("VIGIL_STT_PROVIDER").or(fv.stt_provider) {
        Some(name) => name.parse()?,
        None => SttBackend::Whisper,
    };
    let tts_provider = match env("VIGIL_TTS_PROVIDER").or(fv.tts_provider) {
        Some(name) => name.parse()?,
        None => TtsBackend::OpenAi,
    };

    let default_stt_model = match stt_provider {
        SttBackend::Whisper => "whisper-1",
        SttBackend::Deepgram => "nova-2",
    };
    let (default_tts_model, default_tts_voice) = match tts_provider {
        TtsBackend::OpenAi => ("tts-1", "alloy"),
        // ElevenLabs "Rachel"
        TtsBackend::ElevenLabs => ("eleven_monolingual_v1", "21m00Tcm4TlvDq8ikWAM"),
    };

    let tts_speed = fv.tts_speed.unwrap_or(1.0);
    if !(0.25..=4.0).contains(&tts_speed) {
        return Err(Error::Config(format!(
            "tts_speed must be between 0.25 and 4.0, got {tts_speed}"
        )));
    }

    Ok(VoiceConfig {
        wake_words,
        stt_provider,
        stt_model: env("VIGIL_STT_MODEL")
            .or(fv.stt_model)
            .unwrap_or_else(|| default_stt_model.to_string()),
        tts_provider,
        tts_model: env("VIGIL_TTS_MODEL")
            .or(fv.tts_model)
            .unwrap_or_else(|| default_tts_model.to_string()),
        tts_voice: env("VIGIL_TTS_VOICE")
            .or(fv.tts_voice)
            .unwrap_or_else(|| default_tts_voice.to_string()),
        tts_speed,
    })
}

/// Parse a numeric environment value, rejecting garbage instead of ignoring it
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key}: invalid value '{raw}'")))
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected a boolean, got '{raw}'"))),
    }
}

/// Split a comma-separated list, dropping blanks
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
