use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use live_audio::audio::{decode, encode_with_rate, pcm_to_wav};
use live_audio::{
    AudioSession, CaptureChain, Config, Connector, CpalMicrophone, LiveConnector, OutputDevice,
    PlaybackFormat, StatusReporter, Transport, TransportEvent, VoicePipeline, handle_event,
};

/// Live Audio - talk to a native-audio model over a duplex stream
#[derive(Parser)]
#[command(name = "live-audio", version, about)]
struct Cli {
    /// Prebuilt voice for model speech
    #[arg(long, env = "LIVE_AUDIO_VOICE")]
    voice: Option<String>,

    /// Model to open the session with
    #[arg(long, env = "LIVE_AUDIO_MODEL")]
    model: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Start a live voice session (default)
    Run,
    /// Test microphone input through the capture chain
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured PCM to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker {
        /// Interrupt playback after this many seconds
        #[arg(long)]
        interrupt_after: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,live_audio=info",
        1 => "info,live_audio=debug",
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
    let mut config = Config::load()?;
    if let Some(voice) = cli.voice {
        config.session.voice = voice;
    }
    if let Some(model) = cli.model {
        config.session.model = model;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_session(&config).await,
        Command::TestMic { duration, output } => test_mic(&config, duration, output.as_deref()).await,
        Command::TestSpeaker { interrupt_after } => test_speaker(&config, interrupt_after).await,
    }
}

/// Run a live session until the remote side closes or Ctrl-C
///
/// Pressing Enter tears the session down and opens a fresh one.
#[allow(clippy::future_not_send)]
async fn run_session(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        model = %config.session.model,
        voice = %config.session.voice,
        "starting live audio session"
    );

    let session = AudioSession::new(config.audio.clone())?;
    let output = OutputDevice::open(session.mixer(), config.audio.output_channels)?;
    if output.channels() != config.audio.output_channels {
        tracing::info!(
            device_channels = output.channels(),
            "output device opened with a different channel count"
        );
    }

    let reporter = StatusReporter::new();
    let mut status_rx = reporter.subscribe();

    let connector = LiveConnector::new(config.session.clone());
    let (events_tx, events_rx) = mpsc::channel(config.audio.event_queue_depth);
    let transport = connector.connect(events_tx).await?;

    let mut pipeline = VoicePipeline::new(
        &session,
        Box::new(CpalMicrophone::new(config.audio.capture_sample_rate)),
        transport,
        events_rx,
        reporter.clone(),
    );
    pipeline.start_capture()?;
    println!("Listening. Press Enter to reset the session, Ctrl-C to quit.");

    let input_bus = session.input_bus();
    let output_bus = session.output_bus();
    let mut meter = tokio::time::interval(Duration::from_secs(5));
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut was_connected = false;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("interrupted, shutting down");
                break;
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        if let Err(e) = pipeline.reset(&connector).await {
                            tracing::error!(error = %e, "could not re-establish the session");
                            break;
                        }
                    }
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                match &status.error {
                    Some(error) => tracing::warn!(status = %status.message, error = %error, "status"),
                    None => tracing::info!(status = %status.message, "status"),
                }
                if status.error.is_some() {
                    reporter.clear_error();
                }
                if was_connected && !status.connected {
                    break;
                }
                was_connected = status.connected;
            }
            _ = meter.tick() => {
                let input = input_bus.level();
                let output = output_bus.level();
                tracing::debug!(
                    input_rms = input.rms,
                    output_rms = output.rms,
                    queued = pipeline.scheduler().active_count(),
                    dropped = pipeline.capture().dropped_blocks(),
                    "levels"
                );
            }
        }
    }

    let transport = pipeline.transport();
    pipeline.shutdown();
    if let Err(e) = transport.close().await {
        tracing::debug!(error = %e, "session already closed");
    }
    session.teardown();

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(
    config: &Config,
    duration: u64,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let session = AudioSession::new(config.audio.clone())?;
    let capture_rate = config.audio.capture_sample_rate;

    // Generous queue so a slow terminal never drops blocks
    let (tx, mut rx) = mpsc::channel(config.audio.send_queue_depth.max(1024));
    let collector = tokio::spawn(async move {
        let mut pcm = Vec::new();
        while let Some(blob) = rx.recv().await {
            match decode(&blob) {
                Ok(raw) => pcm.extend(raw),
                Err(e) => tracing::warn!(error = %e, "bad captured block"),
            }
        }
        pcm
    });

    let mut capture = CaptureChain::new(
        &session,
        Box::new(CpalMicrophone::new(capture_rate)),
        tx,
        StatusReporter::new(),
    );
    capture.start()?;

    println!("Capture rate: {capture_rate} Hz");
    println!("---");

    let input_bus = session.input_bus();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let level = input_bus.level();

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level.rms * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            level.rms,
            level.peak,
            meter
        );
    }

    capture.stop();
    let sent = capture.sent_blocks();
    let dropped = capture.dropped_blocks();
    drop(capture);

    let pcm = collector.await?;
    println!("\n---");
    println!("Blocks sent: {sent}, dropped: {dropped}");

    if let Some(path) = output {
        let wav = pcm_to_wav(&pcm, capture_rate)?;
        std::fs::write(&path, wav)?;
        println!("Wrote {} samples to {}", pcm.len(), path.display());
    }

    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave streamed in chunks
#[allow(clippy::future_not_send, clippy::cast_precision_loss)]
async fn test_speaker(config: &Config, interrupt_after: Option<f64>) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let session = AudioSession::new(config.audio.clone())?;
    let _output = OutputDevice::open(session.mixer(), config.audio.output_channels)?;
    let scheduler = session.scheduler();
    let reporter = StatusReporter::new();
    let format = PlaybackFormat {
        sample_rate: config.audio.playback_sample_rate,
        channels: config.audio.output_channels,
    };

    let sample_rate = format.sample_rate;
    let frequency = 440.0_f32;
    let chunk_len = usize::try_from(sample_rate / 10)?;

    // Twenty 100ms chunks, queued back to back like model speech
    for chunk in 0..20 {
        let samples: Vec<f32> = (0..chunk_len)
            .map(|i| {
                let t = (chunk * chunk_len + i) as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
            })
            .collect();
        let blob = encode_with_rate(&samples, sample_rate);
        handle_event(TransportEvent::Audio(blob), &scheduler, &reporter, format);
    }

    println!(
        "Queued {} chunks, playback ends at {:.2}s",
        scheduler.active_count(),
        scheduler.cursor()
    );

    if let Some(secs) = interrupt_after {
        tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await;
        handle_event(TransportEvent::Interrupted, &scheduler, &reporter, format);
        println!("Interrupted after {secs:.2}s");
    }

    // Wait for the queue to drain
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !scheduler.is_idle() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    session.teardown();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
