use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use devspeak::app::{build_completion, build_tts};
use devspeak::console::turn_label;
use devspeak::voice::{
    AudioCapture, AudioPlayback, CancelToken, PLAYBACK_SAMPLE_RATE, SpeakerOutput, SpeechOutput,
    rms,
};
use devspeak::{App, CompletionClient, Config, Turn};

/// DevSpeak - voice conversations with an AI persona
#[derive(Parser)]
#[command(name = "devspeak", version, about)]
struct Cli {
    /// Persona JSON file; omit for the built-in persona
    #[arg(short, long, env = "DEVSPEAK_PERSONA")]
    persona: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Show replies without speaking them
    #[arg(long, env = "DEVSPEAK_MUTE")]
    no_speech_output: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Voice chat in the terminal (default)
    Chat,
    /// Ask one question by text
    Ask {
        /// Question to send
        text: String,
        /// Speak the reply
        #[arg(long)]
        speak: bool,
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
        0 => "info,devspeak=info",
        1 => "info,devspeak=debug",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so the transcript owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let persona = cli.persona.as_deref();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let config = Config::load(persona, cli.no_speech_output)?;
            tracing::debug!(?config, "loaded configuration");
            App::new(config).run().await?;
            Ok(())
        }
        Command::Ask { text, speak } => {
            let config = Config::load(persona, cli.no_speech_output || !speak)?;
            ask(&config, &text).await
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(persona, &text).await,
    }
}

/// One completion round-trip without the microphone
async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let client = build_completion(config)?;
    let name = config.persona.name();

    let question = Turn::user(text.trim());
    println!("{}", turn_label(&question, name));
    println!("  {}\n", question.text());
    println!("{name} is thinking...");

    let reply = client.complete(question.text(), &[]).await?;
    let answer = Turn::assistant(reply);
    println!("{}", turn_label(&answer, name));
    println!("  {}", answer.text());

    if config.voice.speak_replies {
        let output = SpeakerOutput::new(build_tts(config)?);
        output.speak(answer.text(), CancelToken::default()).await?;
    }

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

        let samples = capture.peek_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in and allowed for this terminal?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("Voice chat treats RMS above 0.03 as speech (voice.energy_threshold).");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let sample_rate = PLAYBACK_SAMPLE_RATE as f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || {
        let playback = AudioPlayback::new()?;
        playback.play(samples, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Synthesize and play text with the configured TTS provider
async fn test_tts(persona: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(persona, false)?;
    let tts = build_tts(&config)?;

    println!(
        "Synthesizing speech ({:?}, voice {})...",
        tts.provider(),
        config.voice.tts_voice
    );
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    tokio::task::spawn_blocking(move || {
        let playback = AudioPlayback::new()?;
        playback.play_mp3(&mp3_data, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
