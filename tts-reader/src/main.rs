//! tts-reader - command-line entry point
//!
//! Reads text aloud through Piper with streaming playback, exports audio
//! files and manages installed voices.

use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tts_common::config::{default_cache_dir, resolve_config_path};
use tts_common::{EventBus, Settings};
use tts_reader::catalog::{
    filter_by_language, is_voice_installed, model_size_mb, unique_languages, CatalogClient,
    VoiceDownloader, VoiceEntry,
};
use tts_reader::playback::{CpalDevice, NullDevice, PlaybackDevice};
use tts_reader::status::spawn_reporter;
use tts_reader::synthesis::BinaryProbe;
use tts_reader::Reader;

/// Command-line arguments for tts-reader
#[derive(Parser, Debug)]
#[command(name = "tts-reader")]
#[command(about = "Streaming text-to-speech with Piper")]
#[command(version)]
struct Args {
    /// Config file (default: <config_dir>/tts-reader/config.toml)
    #[arg(long, global = true, env = "TTS_READER_CONFIG")]
    config: Option<PathBuf>,

    /// Voice key for this invocation (overrides the config file)
    #[arg(long, global = true, env = "TTS_READER_VOICE")]
    voice: Option<String>,

    /// Speed multiplier for this invocation (0.5 - 2.0)
    #[arg(long, global = true, env = "TTS_READER_SPEED")]
    speed: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read text aloud (from TEXT, --file, or standard input)
    ///
    /// While playing, type `p` + Enter to pause/resume and `s` or `q` to stop.
    Speak {
        text: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Synthesize without playing audio
        #[arg(long)]
        no_audio: bool,
    },
    /// Synthesize the whole text into one WAV file
    Export {
        text: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List installed voices
    Voices,
    /// Browse downloadable voices
    Catalog {
        /// Language name or code (e.g. "German", "en")
        #[arg(short, long)]
        language: Option<String>,
        /// Ignore the 24 hour cache
        #[arg(long)]
        refresh: bool,
    },
    /// Download a voice from the catalog
    Download {
        key: String,
        /// Make it the active voice
        #[arg(long)]
        select: bool,
    },
    /// Speak a short sample with a voice, downloading it if needed
    Preview { key: String },
    /// List audio output devices usable as `output_device`
    Devices,
    /// Check that the piper binary can be executed
    TestBinary,
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Set one value, e.g. `config set speed 1.25`
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())?;
    let mut settings = Settings::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tts_reader={0},tts_common={0}", settings.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!(config = %config_path.display(), "Settings loaded");

    if let Some(voice) = &args.voice {
        settings.voice = voice.clone();
    }
    if let Some(speed) = args.speed {
        settings.speed = speed;
    }
    settings.normalize();

    match args.command {
        Command::Speak {
            text,
            file,
            no_audio,
        } => {
            let interactive = text.is_some() || file.is_some();
            let text = read_input(text, file.as_deref())?;
            speak(settings, &text, no_audio, interactive).await
        }
        Command::Export { text, file, output } => {
            let text = read_input(text, file.as_deref())?;
            let reader = Reader::new(settings, Box::new(NullDevice::new()), EventBus::default());
            let written = reader.export_single_file(&text, &output).await;
            reader.shutdown().await;
            let written = written.context("Export failed")?;
            println!("Exported to {}", written.display());
            Ok(())
        }
        Command::Voices => list_voices(&settings).await,
        Command::Catalog { language, refresh } => {
            show_catalog(&settings, language.as_deref(), refresh).await
        }
        Command::Download { key, select } => {
            download(&settings, &key).await?;
            if select {
                let mut stored = Settings::load(&config_path)?;
                stored.set_field("voice", &key)?;
                stored.save(&config_path)?;
                println!("Active voice set to {}", key);
            }
            Ok(())
        }
        Command::Preview { key } => {
            if !is_voice_installed(&key, &settings.models_dir) {
                download(&settings, &key).await?;
            }
            let sample = format!("Hello! This is the {} voice from Piper TTS.", voice_name(&key));
            settings.voice = key;
            speak(settings, &sample, false, true).await
        }
        Command::Devices => {
            let devices = CpalDevice::list_devices().context("Failed to list audio devices")?;
            if devices.is_empty() {
                println!("No output devices found");
            }
            for name in devices {
                let marker = if settings.output_device.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, name);
            }
            Ok(())
        }
        Command::TestBinary => {
            let reader = Reader::new(settings.clone(), Box::new(NullDevice::new()), EventBus::default());
            match reader.test_binary().await {
                BinaryProbe::Reachable => {
                    println!("piper OK: {}", settings.engine_binary.display());
                    Ok(())
                }
                BinaryProbe::Errored(reason) => {
                    println!(
                        "piper found at {} but --help failed: {}",
                        settings.engine_binary.display(),
                        reason
                    );
                    Ok(())
                }
                BinaryProbe::NotFound => {
                    bail!("piper not found at {}", settings.engine_binary.display())
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&settings)?);
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                let mut stored = Settings::load(&config_path)?;
                stored.set_field(&key, &value)?;
                stored.save(&config_path)?;
                println!("{} updated", key);
                Ok(())
            }
        },
    }
}

async fn speak(settings: Settings, text: &str, no_audio: bool, interactive: bool) -> Result<()> {
    let device: Box<dyn PlaybackDevice> = if no_audio {
        Box::new(NullDevice::new())
    } else {
        Box::new(
            CpalDevice::open(settings.output_device.clone())
                .context("Failed to open audio output")?,
        )
    };

    let bus = EventBus::default();
    let reporter = spawn_reporter(bus.subscribe());
    let reader = Arc::new(Reader::new(settings, device, bus));

    let ctrl_c = {
        let reader = Arc::clone(&reader);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
                reader.stop().await;
            }
        })
    };
    let controls = interactive.then(|| spawn_controls(Arc::clone(&reader)));

    let result = reader.speak(text).await;
    if result.is_ok() {
        reader.wait_until_finished().await;
    }
    reader.shutdown().await;

    ctrl_c.abort();
    if let Some(controls) = controls {
        controls.abort();
    }
    reporter.abort();
    eprintln!();

    result.context("Speak failed")
}

/// Pause/stop keys typed on standard input while playing
fn spawn_controls(reader: Arc<Reader>) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Blocking stdin reads get their own thread so they never hold up shutdown
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            match line.trim() {
                "p" => reader.toggle_pause().await,
                "s" | "q" => {
                    reader.stop().await;
                    break;
                }
                _ => {}
            }
        }
    })
}

fn read_input(text: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read standard input")?;
    Ok(text)
}

async fn list_voices(settings: &Settings) -> Result<()> {
    let reader = Reader::new(settings.clone(), Box::new(NullDevice::new()), EventBus::default());
    let voices = reader.installed_voices().await?;
    if voices.is_empty() {
        println!(
            "No voices installed in {}. Try `tts-reader catalog` and `tts-reader download <key>`.",
            settings.models_dir.display()
        );
        return Ok(());
    }

    for key in voices {
        let marker = if settings.voice_key() == Some(key.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, key);
    }
    Ok(())
}

async fn show_catalog(settings: &Settings, language: Option<&str>, refresh: bool) -> Result<()> {
    let client = CatalogClient::new(default_cache_dir())?;
    let voices = client.fetch(refresh).await?;

    let shown: Vec<&VoiceEntry> = match language {
        Some(language) => filter_by_language(&voices, language),
        None => voices.iter().collect(),
    };

    if shown.is_empty() {
        println!("No voices match. Languages: {}", unique_languages(&voices).join(", "));
        return Ok(());
    }

    for voice in shown {
        let size = model_size_mb(voice)
            .map(|mb| format!("{:.0} MB", mb))
            .unwrap_or_else(|| "?".to_string());
        let installed = if is_voice_installed(&voice.key, &settings.models_dir) {
            "installed"
        } else {
            ""
        };
        println!(
            "{:<36} {:<8} {:<24} {:>7} {}",
            voice.key, voice.quality, voice.country_english, size, installed
        );
    }
    Ok(())
}

async fn download(settings: &Settings, key: &str) -> Result<()> {
    let client = CatalogClient::new(default_cache_dir())?;
    let voices = client.fetch(false).await?;
    let voice = voices
        .iter()
        .find(|v| v.key == key)
        .with_context(|| format!("No voice named {} in the catalog", key))?;

    let bus = EventBus::default();
    let reporter = spawn_reporter(bus.subscribe());
    let downloader = VoiceDownloader::new()?.with_event_bus(bus);

    let result = downloader
        .download_voice(voice, &settings.models_dir, |_| {})
        .await;

    // The reporter ends once the last bus handle is gone
    drop(downloader);
    let _ = reporter.await;
    eprintln!();
    result.with_context(|| format!("Failed to download {}", key))?;

    println!("Installed {} into {}", key, settings.models_dir.display());
    Ok(())
}

/// Speaker name from a key like `en_US-amy-medium`
fn voice_name(key: &str) -> &str {
    key.split('-').nth(1).unwrap_or(key)
}
