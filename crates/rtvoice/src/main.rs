//! # rtvoice
//!
//! Realtime voice session binary. Loads settings, wires a [`VoiceSession`]
//! to file or stdio PCM streams and runs it until Ctrl-C.

#![deny(unsafe_code)]

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rtvoice_audio::{MicSource, OutputDevice, PcmFormat, ReaderMic, WriterDevice};
use rtvoice_core::logging::{LogFormat, init_logging};
use rtvoice_core::metrics::SessionMetrics;
use rtvoice_runtime::{SessionParts, VoiceSession, redactor_for, summarizer_for, tools_for};
use rtvoice_settings::loader::{load_settings_from_path, settings_path};
use rtvoice_settings::{Provider, VoiceSettings};
use rtvoice_transport::Endpoint;

use crate::cli::{Cli, Command, RunArgs, masked_settings};

fn load(path: Option<PathBuf>) -> Result<VoiceSettings> {
    let path = path.unwrap_or_else(settings_path);
    load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn check_credentials(settings: &VoiceSettings) -> Result<()> {
    match settings.api.provider {
        Provider::OpenAi if settings.api.api_key.is_empty() => {
            bail!("No API key: set api.apiKey in the settings file or OPENAI_API_KEY")
        }
        Provider::Azure if settings.api.azure_endpoint.as_deref().unwrap_or_default().is_empty() => {
            bail!("No Azure endpoint: set api.azureEndpoint in the settings file")
        }
        _ => Ok(()),
    }
}

fn session_parts(settings: &VoiceSettings) -> Result<SessionParts> {
    let format = PcmFormat::pcm16_mono(settings.audio.sample_rate_hz);
    let device: Arc<dyn OutputDevice> = match &settings.audio.output_path {
        Some(path) => Arc::new(WriterDevice::file(path)),
        None => Arc::new(WriterDevice::stdout()),
    };
    let mic: Arc<dyn MicSource> = match &settings.audio.input_path {
        Some(path) => Arc::new(ReaderMic::file(path, format, settings.audio.chunk_ms)),
        None => Arc::new(ReaderMic::stdin(format, settings.audio.chunk_ms)),
    };
    Ok(SessionParts {
        endpoint: Endpoint::from_settings(&settings.api),
        device,
        mic: Some(mic),
        summarizer: summarizer_for(settings).context("Failed to create summarizer")?,
        redactor: redactor_for(settings),
        tools: tools_for(settings).context("Failed to create tools")?,
        metrics: SessionMetrics::new(),
    })
}

async fn run(args: RunArgs) -> Result<()> {
    let mut settings = load(args.settings.clone())?;
    args.apply(&mut settings);
    settings.validate();

    let format = settings.logging.format.parse::<LogFormat>().unwrap_or_default();
    init_logging(format, &settings.logging.level).context("Failed to initialise logging")?;

    if args.verbose {
        eprintln!("{}", serde_json::to_string_pretty(&masked_settings(&settings))?);
    }
    check_credentials(&settings)?;

    let session = Arc::new(VoiceSession::new(&settings, session_parts(&settings)?));

    let stopper = Arc::clone(&session);
    let _ = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Shutting down...");
        stopper.stop().await;
    });

    session.run().await.context("Voice session failed")?;

    let metrics = session.metrics();
    tracing::info!(
        reconnections = metrics.reconnections.get(),
        turns = metrics.turns.get(),
        summaries = metrics.summaries.get(),
        audio_frames_dropped = metrics.audio_frames_dropped.get(),
        audio_output_dropped = metrics.audio_output_dropped.get(),
        "Shutdown complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Settings(args) => {
            let settings = load(args.settings)?;
            println!("{}", serde_json::to_string_pretty(&masked_settings(&settings))?);
            Ok(())
        }
    }
}
