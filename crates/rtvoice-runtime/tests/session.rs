#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rtvoice_audio::{MemoryDevice, MicSource, OutputDevice, PcmFormat, ReaderMic};
use rtvoice_context::{ExtractiveSummarizer, Summarizer};
use rtvoice_core::metrics::SessionMetrics;
use rtvoice_runtime::{SessionParts, Tool, ToolError, ToolRegistry, VoiceSession};
use rtvoice_settings::VoiceSettings;
use rtvoice_transport::Endpoint;
use rtvoice_transport::testutil::{FakeRealtimeServer, Step};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

fn settings() -> VoiceSettings {
    let mut s = VoiceSettings::default();
    s.audio.jitter_ms = 0;
    s.transport.backoff_base_ms = 10;
    s.transport.backoff_max_ms = 40;
    s.transport.ping_interval_ms = 0;
    s.transcripts.fetch_attempts = 5;
    s.transcripts.fetch_delay_ms = 20;
    s
}

fn parts(server: &FakeRealtimeServer, device: &Arc<MemoryDevice>, tools: ToolRegistry) -> SessionParts {
    SessionParts {
        endpoint: Endpoint::new(server.url()),
        device: Arc::clone(device) as Arc<dyn OutputDevice>,
        mic: None,
        summarizer: Arc::new(ExtractiveSummarizer) as Arc<dyn Summarizer>,
        redactor: None,
        tools,
        metrics: SessionMetrics::new(),
    }
}

fn start(session: &Arc<VoiceSession>) -> JoinHandle<()> {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        session.run().await.unwrap();
    })
}

async fn finish(session: &VoiceSession, runner: JoinHandle<()>) {
    session.stop().await;
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("session did not stop")
        .unwrap();
}

/// Poll `done` for up to five seconds.
async fn eventually(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    done()
}

fn ids(session: &VoiceSession) -> Vec<String> {
    session.context().history().into_iter().map(|t| t.item_id).collect()
}

fn response_done(id: &str, item_id: &str, text: &str, tokens: u64) -> Step {
    Step::Send(json!({
        "type": "response.done",
        "response": {
            "id": id,
            "output": [{"id": item_id, "role": "assistant", "content": [{"transcript": text}]}],
            "usage": {"total_tokens": tokens}
        }
    }))
}

#[tokio::test]
async fn barge_in_cancels_and_silences_the_interrupted_response() {
    let server = FakeRealtimeServer::start(vec![vec![
        Step::WaitFor("session.update"),
        Step::Send(json!({"type": "response.created", "response": {"id": "r1"}})),
        Step::Send(json!({"type": "response.audio.delta", "response_id": "r1", "audio": "AAAAAA=="})),
        Step::Send(json!({
            "type": "conversation.item.created",
            "item": {"id": "u1", "role": "user", "content": [{"transcript": "stop"}]}
        })),
        Step::WaitFor("response.cancel"),
        Step::Send(json!({"type": "response.audio.delta", "response_id": "r1", "audio": "AAAAAA=="})),
        response_done("r2", "a1", "okay", 10),
    ]])
    .await
    .unwrap();
    let device = Arc::new(MemoryDevice::new());
    let session = Arc::new(VoiceSession::new(&settings(), parts(&server, &device, ToolRegistry::new())));
    let runner = start(&session);

    assert!(eventually(|| ids(&session).contains(&"a1".to_string())).await);
    finish(&session, runner).await;

    let cancels: Vec<Value> = server
        .received()
        .into_iter()
        .filter(|v| v["type"] == "response.cancel")
        .collect();
    assert_eq!(cancels, vec![json!({"type": "response.cancel", "response_id": "r1"})]);
    // One playback epoch, ended by the flush; the late delta never reopened it.
    assert_eq!(device.opens(), 1);
    assert_eq!(device.stops(), 1);
    assert_eq!(session.client().active_response(), None);
}

#[tokio::test]
async fn summary_waits_for_backfilled_transcript_then_prunes() {
    let server = FakeRealtimeServer::start(vec![vec![
        Step::WaitFor("session.update"),
        Step::Send(json!({"type": "conversation.item.created", "item": {"id": "u1", "role": "user"}})),
        response_done("r1", "a1", "hola", 10),
        Step::Send(json!({
            "type": "conversation.item.created",
            "item": {"id": "u2", "role": "user", "content": [{"transcript": "gracias"}]}
        })),
        response_done("r2", "a2", "de nada", 5000),
        Step::WaitFor("conversation.item.retrieve"),
        Step::Send(json!({
            "type": "conversation.item.retrieved",
            "item": {"id": "u1", "role": "user", "content": [{"transcript": "hola"}]}
        })),
        Step::WaitFor("conversation.item.delete"),
        Step::WaitFor("conversation.item.delete"),
    ]])
    .await
    .unwrap();
    let mut s = settings();
    s.summary.keep_last_turns = 2;
    s.summary.trigger_tokens = 1000;
    let device = Arc::new(MemoryDevice::new());
    let session = Arc::new(VoiceSession::new(&s, parts(&server, &device, ToolRegistry::new())));
    let runner = start(&session);

    assert!(eventually(|| ids(&session).first().is_some_and(|id| id == "summary-1")).await);
    assert!(server.wait_for("conversation.item.delete").await);
    assert!(
        eventually(|| {
            server
                .received_types()
                .iter()
                .filter(|t| *t == "conversation.item.delete")
                .count()
                == 2
        })
        .await
    );
    finish(&session, runner).await;

    assert_eq!(ids(&session), vec!["summary-1", "u2", "a2"]);
    let received = server.received();
    let create = received
        .iter()
        .position(|v| v["type"] == "conversation.item.create")
        .unwrap();
    assert_eq!(received[create]["previous_item_id"], "root");
    assert_eq!(received[create]["item"]["role"], "system");
    let deleted: Vec<&str> = received[create..]
        .iter()
        .filter(|v| v["type"] == "conversation.item.delete")
        .filter_map(|v| v["item_id"].as_str())
        .collect();
    assert_eq!(deleted, vec!["u1", "a1"]);
    assert!(
        received
            .iter()
            .any(|v| v == &json!({"type": "conversation.item.retrieve", "item_id": "u1"}))
    );
    assert_eq!(session.metrics().summaries.get(), 1);
}

struct Noon;

#[async_trait]
impl Tool for Noon {
    fn name(&self) -> &str {
        "clock"
    }
    fn description(&self) -> &str {
        "Current time"
    }
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn call(&self, _arguments: Value) -> Result<String, ToolError> {
        Ok("noon".into())
    }
}

#[tokio::test]
async fn tool_call_roundtrip() {
    let server = FakeRealtimeServer::start(vec![vec![
        Step::WaitFor("session.update"),
        Step::Send(json!({
            "type": "response.output_item.create",
            "response_id": "r1",
            "item": {"type": "tool_call", "name": "clock", "call_id": "c1", "arguments": {}}
        })),
        Step::WaitFor("response.output_item.create"),
        response_done("r1", "a1", "time is noon", 10),
    ]])
    .await
    .unwrap();
    let mut tools = ToolRegistry::builtin(Duration::from_secs(1)).unwrap();
    tools.register(Arc::new(Noon));
    let device = Arc::new(MemoryDevice::new());
    let session = Arc::new(VoiceSession::new(&settings(), parts(&server, &device, tools)));
    let runner = start(&session);

    assert!(eventually(|| !session.context().history().is_empty()).await);
    finish(&session, runner).await;

    let received = server.received();
    let advertised: BTreeSet<&str> = received[0]["session"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(advertised, BTreeSet::from(["clock", "http_get"]));

    let result = received
        .iter()
        .find(|v| v["type"] == "response.output_item.create")
        .unwrap();
    assert_eq!(result["response_id"], "r1");
    assert_eq!(result["item"]["call_id"], "c1");
    assert_eq!(result["item"]["content"][0]["text"], "noon");
    assert_eq!(session.context().history()[0].text.as_deref(), Some("time is noon"));
}

#[tokio::test]
async fn microphone_chunks_are_streamed_after_handshake() {
    let server = FakeRealtimeServer::start(vec![vec![
        Step::WaitFor("input_audio_buffer.append"),
        Step::WaitFor("input_audio_buffer.append"),
    ]])
    .await
    .unwrap();
    // 24 kHz PCM16, 10 ms chunks: 480 bytes each.
    let format = PcmFormat::pcm16_mono(24_000);
    let mic = ReaderMic::from_opener(
        || Ok(Box::new(Cursor::new(vec![0u8; 960])) as Box<dyn tokio::io::AsyncRead + Send + Unpin>),
        format,
        10,
    )
    .unpaced();
    let device = Arc::new(MemoryDevice::new());
    let mut p = parts(&server, &device, ToolRegistry::new());
    p.mic = Some(Arc::new(mic) as Arc<dyn MicSource>);
    let session = Arc::new(VoiceSession::new(&settings(), p));
    let runner = start(&session);

    assert!(
        eventually(|| {
            server
                .received_types()
                .iter()
                .filter(|t| *t == "input_audio_buffer.append")
                .count()
                == 2
        })
        .await
    );
    finish(&session, runner).await;

    let types = server.received_types();
    assert_eq!(types[0], "session.update");
    assert_eq!(session.metrics().audio_frames_dropped.get(), 0);
}

#[tokio::test]
async fn stop_before_connect_returns_cleanly() {
    let server = FakeRealtimeServer::start(vec![vec![Step::RejectHandshake]; 50])
        .await
        .unwrap();
    let device = Arc::new(MemoryDevice::new());
    let session = Arc::new(VoiceSession::new(&settings(), parts(&server, &device, ToolRegistry::new())));
    let runner = start(&session);

    tokio::time::sleep(Duration::from_millis(50)).await;
    finish(&session, runner).await;

    assert!(session.client().is_stopped());
    assert_eq!(device.opens(), 0);
}
