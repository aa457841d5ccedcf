//! Daemon - the voice assistant service
//!
//! Builds the audio/HTTP adapters from configuration and drives the session
//! loop until Ctrl-C.

use std::rc::Rc;

use tokio_util::sync::CancellationToken;

use crate::conversation::{
    Collaborators, EndingDetector, NullLog, SessionLoop, TurnLog,
};
use crate::db::ConversationLog;
use crate::llm::build_model_client;
use crate::voice::{
    AudioCapture, AudioPlayback, EnergyVad, Speaker, SpeechToText, TextToSpeech,
    UtteranceRecorder, WakeListener, WakeWordMatcher,
};
use crate::{Config, Error, Result};

/// The Vigil daemon
pub struct Daemon {
    config: Config,
    log: Box<dyn TurnLog>,
}

impl Daemon {
    /// Create a new daemon instance, opening the conversation log if enabled
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the log cannot be opened
    pub fn new(config: Config) -> Result<Self> {
        config.session.validate()?;

        let log: Box<dyn TurnLog> = if config.logging.enabled {
            Box::new(ConversationLog::open(&config.logging.db_path)?)
        } else {
            tracing::info!("conversation logging disabled");
            Box::new(NullLog)
        };

        Ok(Self { config, log })
    }

    /// Wake words this daemon listens for
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.config.voice.wake_words
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if an audio device or API credential is missing, or the
    /// wake listener fails for good
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                on_signal.cancel();
            }
        });

        self.run_until(&cancel).await
    }

    /// Run the voice loop until `cancel` fires
    ///
    /// # Errors
    ///
    /// Same as [`Daemon::run`]
    #[allow(clippy::future_not_send)]
    pub async fn run_until(&self, cancel: &CancellationToken) -> Result<()> {
        let config = &self.config;

        let stt_key = config.stt_api_key().ok_or_else(|| {
            Error::Config(format!("{} API key required for STT", config.voice.stt_provider))
        })?;
        let tts_key = config.tts_api_key().ok_or_else(|| {
            Error::Config(format!("{} API key required for TTS", config.voice.tts_provider))
        })?;

        let stt = SpeechToText::new(
            config.voice.stt_provider,
            stt_key.to_string(),
            config.voice.stt_model.clone(),
        )?;
        let tts = TextToSpeech::new(
            config.voice.tts_provider,
            tts_key.to_string(),
            config.voice.tts_voice.clone(),
            config.voice.tts_model.clone(),
            config.voice.tts_speed,
        )?;
        let matcher = WakeWordMatcher::new(&config.voice.wake_words)?;

        // cpal streams aren't Send; everything below stays on this task
        let mut capture = AudioCapture::new()?;
        capture.start()?;
        let capture = Rc::new(capture);

        let wake = WakeListener::new(
            Rc::clone(&capture),
            stt.clone(),
            matcher,
            config.session.vad_energy_threshold,
        );
        let voice = EnergyVad::new(Rc::clone(&capture));
        let transcriber = UtteranceRecorder::new(
            Rc::clone(&capture),
            stt,
            config.session.vad_energy_threshold,
        );
        let speaker = Speaker::new(tts, AudioPlayback::new()?);
        let model = build_model_client(config);

        let io = Collaborators {
            wake: &wake,
            voice: &voice,
            transcriber: &transcriber,
            model: model.as_ref(),
            speaker: &speaker,
            log: self.log.as_ref(),
        };

        let mut session = SessionLoop::new(&config.session, io)
            .with_detector(EndingDetector::new(&config.ending_phrases));

        tracing::info!(
            wake_words = ?config.voice.wake_words,
            provider = %config.session.provider,
            "vigil ready"
        );
        let result = session.run(cancel).await;

        tracing::info!(conversations = session.conversations(), "voice loop stopped");
        result
    }
}
