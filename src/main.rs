use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vigil::db::{ConversationLog, LogQuery, format_entry};
use vigil::voice::{
    AudioCapture, AudioPlayback, PLAYBACK_SAMPLE_RATE, SampleSource, TextToSpeech, rms,
};
use vigil::{Config, Daemon};

/// Vigil - wake-word voice assistant
#[derive(Parser)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Show logged conversations, newest first
    Logs {
        /// Maximum number of conversations to display
        #[arg(short = 'n', long = "limit", default_value = "10")]
        limit: usize,
        /// Keyword to match in user input or assistant response
        #[arg(long)]
        search: Option<String>,
        /// Only show conversations from this date on (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,vigil=info",
        1 => "info,vigil=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Logs {
                limit,
                search,
                since,
            } => show_logs(LogQuery {
                limit,
                search,
                since,
            }),
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    tracing::info!("starting vigil");

    let config = Config::load()?;
    tracing::debug!(session = ?config.session, llm = ?config.llm, "loaded configuration");

    let daemon = Daemon::new(config)?;
    if let Some(word) = daemon.wake_words().first() {
        tracing::info!("say \"{word}\" to start a conversation");
    }

    daemon.run().await?;

    Ok(())
}

/// Print logged conversations
fn show_logs(query: LogQuery) -> anyhow::Result<()> {
    let config = Config::load()?;

    if !config.logging.enabled {
        anyhow::bail!(
            "conversation logging is disabled (set VIGIL_LOGGING_ENABLED=true to enable it)"
        );
    }
    if !config.logging.db_path.exists() {
        anyhow::bail!(
            "database not found at {} (run vigil at least once to create it)",
            config.logging.db_path.display()
        );
    }

    let log = ConversationLog::open(&config.logging.db_path)?;
    let entries = log.recent(&query)?;

    if entries.is_empty() {
        println!("No conversations found.");
        if let Some(search) = &query.search {
            println!("Try removing the search filter: --search '{search}'");
        }
        if let Some(since) = &query.since {
            println!("Try removing the date filter: --since '{since}'");
        }
        return Ok(());
    }

    println!("\nShowing {} conversation(s):\n", entries.len());
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    println!("{}", "=".repeat(80));
    println!("\nTotal: {} conversation(s)", entries.len());

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_samples();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} ({:>5.0} on the VAD scale) | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            energy * 32768.0,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("Set VIGIL_VAD_ENERGY_THRESHOLD between the quiet and speaking values.");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    playback.play(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test TTS output with the configured provider
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let api_key = config
        .tts_api_key()
        .ok_or_else(|| anyhow::anyhow!("{} API key required", config.voice.tts_provider))?;

    let tts = TextToSpeech::new(
        config.voice.tts_provider,
        api_key.to_string(),
        config.voice.tts_voice.clone(),
        config.voice.tts_model.clone(),
        config.voice.tts_speed,
    )?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    playback.play_mp3(&mp3_data).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
