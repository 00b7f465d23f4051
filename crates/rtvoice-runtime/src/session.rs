//! Session wiring.
//!
//! [`VoiceSession`] assembles one realtime conversation from settings and
//! collaborators: the client, the playback pipeline, the conversation log,
//! the transcript fetcher, the routing table and an optional microphone.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rtvoice_audio::{AudioError, AudioPlayer, MicSource, OutputDevice, PcmFormat, PlayerConfig};
use rtvoice_context::{
    ContextManager, ExtractiveSummarizer, OpenAiSummarizer, Redact, Redactor, Summarizer,
    SummarizerError, SummaryPolicy,
};
use rtvoice_core::metrics::SessionMetrics;
use rtvoice_core::{ErrorCategory, EventHandler, EventSink, ResponseControl};
use rtvoice_settings::VoiceSettings;
use rtvoice_transport::{ClientConfig, ClientError, Endpoint, RealtimeClient};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::fetcher::TranscriptFetcher;
use crate::handlers::{SESSION_EVENT_TYPES, SessionHandlers};
use crate::tools::{ToolCallHandler, ToolError, ToolRegistry};

/// Session setup or teardown failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The client ended with a handler failure.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Playback could not be shut down.
    #[error(transparent)]
    Audio(#[from] AudioError),
    /// Built-in tools could not be created.
    #[error(transparent)]
    Tools(#[from] ToolError),
    /// The HTTP summarizer could not be created.
    #[error(transparent)]
    Summarizer(#[from] SummarizerError),
}

/// Collaborators a session is built from.
pub struct SessionParts {
    /// Where to connect.
    pub endpoint: Endpoint,
    /// Playback device.
    pub device: Arc<dyn OutputDevice>,
    /// Microphone; `None` runs without capture.
    pub mic: Option<Arc<dyn MicSource>>,
    /// Summary generator.
    pub summarizer: Arc<dyn Summarizer>,
    /// Transcript redaction.
    pub redactor: Option<Arc<dyn Redact>>,
    /// Advertised tools. Empty disables tool calls.
    pub tools: ToolRegistry,
    /// Counters and gauges shared by every component.
    pub metrics: SessionMetrics,
}

/// The `session.update` payload: voice, formats, transcription, tools.
pub fn session_config(settings: &VoiceSettings, tools: &ToolRegistry) -> Value {
    let mut session = json!({
        "voice": settings.api.voice,
        "modalities": ["audio", "text"],
        "input_audio_format": "pcm16",
        "output_audio_format": "pcm16",
        "input_audio_transcription": {"model": settings.api.transcribe_model},
    });
    if !tools.is_empty() {
        session["tools"] = Value::Array(tools.specs());
    }
    session
}

/// HTTP summarizer when an API key is configured, the offline one otherwise.
pub fn summarizer_for(settings: &VoiceSettings) -> Result<Arc<dyn Summarizer>, SessionError> {
    if settings.api.api_key.is_empty() {
        return Ok(Arc::new(ExtractiveSummarizer));
    }
    Ok(Arc::new(OpenAiSummarizer::new(
        settings.api.http_base_url(),
        settings.api.api_key.clone(),
        settings.api.summary_model.clone(),
    )?))
}

/// Redactor when redaction is enabled.
pub fn redactor_for(settings: &VoiceSettings) -> Option<Arc<dyn Redact>> {
    settings
        .redaction
        .enabled
        .then(|| Arc::new(Redactor::new(true)) as Arc<dyn Redact>)
}

/// Built-in tools when tools are enabled, otherwise none.
pub fn tools_for(settings: &VoiceSettings) -> Result<ToolRegistry, SessionError> {
    if !settings.tools.enabled {
        return Ok(ToolRegistry::new());
    }
    Ok(ToolRegistry::builtin(Duration::from_millis(settings.tools.http_timeout_ms))?)
}

/// One realtime voice conversation.
pub struct VoiceSession {
    client: Arc<RealtimeClient>,
    dispatcher: Dispatcher,
    player: Arc<AudioPlayer>,
    context: Arc<ContextManager>,
    fetcher: Arc<TranscriptFetcher>,
    mic: Option<Arc<dyn MicSource>>,
}

impl VoiceSession {
    /// Wire a session. Nothing connects until [`run`](Self::run).
    pub fn new(settings: &VoiceSettings, parts: SessionParts) -> Self {
        let SessionParts {
            endpoint,
            device,
            mic,
            summarizer,
            redactor,
            tools,
            metrics,
        } = parts;

        let config =
            ClientConfig::from_settings(&settings.transport).with_session(session_config(settings, &tools));
        let client = Arc::new(RealtimeClient::new(endpoint, config, metrics.clone()));

        let player = Arc::new(AudioPlayer::new(
            PlayerConfig {
                format: PcmFormat::pcm16_mono(settings.audio.sample_rate_hz),
                jitter_ms: settings.audio.jitter_ms,
                queue_capacity: settings.audio.output_queue_capacity,
            },
            device,
            metrics.audio_output_dropped.clone(),
            metrics.audio_output_queue_depth.clone(),
        ));

        let mut policy = SummaryPolicy::new(
            settings.summary.trigger_tokens,
            settings.summary.keep_last_turns,
            settings.summary.language_policy,
        );
        policy.base_language.clone_from(&settings.summary.base_language);
        let mut context = ContextManager::new(policy, summarizer, metrics);
        if let Some(redactor) = redactor {
            context = context.with_redactor(redactor);
        }
        let context = Arc::new(context);

        let fetcher = Arc::new(TranscriptFetcher::new(
            Arc::clone(&client) as Arc<dyn EventSink>,
            Arc::clone(&context),
            TranscriptFetcher::policy_from_settings(&settings.transcripts),
            client.stop_token(),
        ));

        let handlers: Arc<dyn EventHandler> = Arc::new(
            SessionHandlers::new(
                Arc::clone(&client) as Arc<dyn ResponseControl>,
                Arc::clone(&player),
                Arc::clone(&context),
            )
            .with_fetcher(Arc::clone(&fetcher)),
        );
        let mut dispatcher = Dispatcher::new();
        let _ = dispatcher.on_all(SESSION_EVENT_TYPES, &handlers);
        if !tools.is_empty() {
            let _ = dispatcher.on(
                "response.output_item.create",
                Arc::new(ToolCallHandler::new(
                    Arc::clone(&client) as Arc<dyn EventSink>,
                    Arc::new(tools),
                )),
            );
        }

        tracing::info!(
            model = %settings.api.realtime_model,
            voice = %settings.api.voice,
            sample_rate = settings.audio.sample_rate_hz,
            summary_trigger = settings.summary.trigger_tokens,
            "voice session configured"
        );

        Self {
            client,
            dispatcher,
            player,
            context,
            fetcher,
            mic,
        }
    }

    /// The realtime client.
    pub fn client(&self) -> &Arc<RealtimeClient> {
        &self.client
    }

    /// The conversation log.
    pub fn context(&self) -> &Arc<ContextManager> {
        &self.context
    }

    /// The playback pipeline.
    pub fn player(&self) -> &Arc<AudioPlayer> {
        &self.player
    }

    /// Shared metrics.
    pub fn metrics(&self) -> &SessionMetrics {
        self.client.metrics()
    }

    /// Run until [`stop`](Self::stop) or a handler failure.
    ///
    /// Capture, transcript fetches and playback are shut down before
    /// returning. A handler failure wins over a playback shutdown failure.
    pub async fn run(&self) -> Result<(), SessionError> {
        let stop = self.client.stop_token();
        let capture = self.mic.as_ref().map(|mic| {
            tokio::spawn(pump_mic(Arc::clone(mic), Arc::clone(&self.client), stop.clone()))
        });

        let result = self.client.connect(&self.dispatcher).await;

        self.client.close().await;
        if let Some(capture) = capture {
            let _ = capture.await;
        }
        self.fetcher.shutdown().await;
        let stopped = self.player.stop().await;
        tracing::info!(ok = result.is_ok(), "voice session ended");

        result?;
        stopped?;
        Ok(())
    }

    /// Ask [`run`](Self::run) to return.
    pub async fn stop(&self) {
        self.client.close().await;
    }
}

/// Forward microphone chunks to the outbound queue until stopped or the
/// input ends.
async fn pump_mic(mic: Arc<dyn MicSource>, client: Arc<RealtimeClient>, stop: CancellationToken) {
    let mut chunks = mic.chunks();
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            next = chunks.next() => match next {
                Some(Ok(chunk)) => client.append_audio(chunk),
                Some(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        error_category = ErrorCategory::Audio.as_str(),
                        "microphone failed, capture stopped"
                    );
                    break;
                }
                None => {
                    tracing::debug!("microphone input ended");
                    break;
                }
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
