//! Scripted in-process realtime server for tests.
//!
//! Each accepted connection runs the next script in order; connections past
//! the end of the list just stay open until the client leaves. Every text
//! frame the client sends is recorded as JSON.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

/// One scripted server action.
#[derive(Clone, Debug)]
pub enum Step {
    /// Send a JSON event.
    Send(Value),
    /// Send a raw text frame.
    SendRaw(String),
    /// Wait until the client has sent (another) event of this type on this
    /// connection.
    WaitFor(&'static str),
    /// Pause.
    Sleep(Duration),
    /// Send a close frame.
    Close,
    /// Hang up without a close frame.
    Drop,
    /// Stop reading (no pongs) but keep the socket open.
    Stall,
    /// Close the TCP connection before the WebSocket handshake.
    RejectHandshake,
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<Value>>,
    connections: AtomicUsize,
}

/// Running fake server. Aborted on drop.
pub struct FakeRealtimeServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl FakeRealtimeServer {
    /// Bind `127.0.0.1:0` and start serving `scripts`.
    pub async fn start(scripts: Vec<Vec<Step>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());
        let accept_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            let mut scripts = scripts.into_iter();
            while let Ok((stream, _)) = listener.accept().await {
                let script = scripts.next().unwrap_or_default();
                let shared = Arc::clone(&accept_shared);
                let _ = tokio::spawn(serve(stream, script, shared));
            }
        });
        Ok(Self { addr, shared, task })
    }

    /// `ws://` URL of the server.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Every event received so far, across connections.
    pub fn received(&self) -> Vec<Value> {
        self.shared.received.lock().clone()
    }

    /// `type` of every received event.
    pub fn received_types(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Completed WebSocket handshakes.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Wait until an event of `event_type` has been received.
    pub async fn wait_for(&self, event_type: &str) -> bool {
        poll_until(|| self.received_types().iter().any(|t| t == event_type)).await
    }
}

impl Drop for FakeRealtimeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(POLL).await;
    }
    done()
}

async fn serve(stream: TcpStream, script: Vec<Step>, shared: Arc<Shared>) {
    if matches!(script.first(), Some(Step::RejectHandshake)) {
        drop(stream);
        return;
    }
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let _ = shared.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut source) = ws.split();

    let local: Arc<Mutex<Vec<Value>>> = Arc::default();
    let closed = Arc::new(AtomicBool::new(false));
    let reader = {
        let local = Arc::clone(&local);
        let closed = Arc::clone(&closed);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(Ok(message)) = source.next().await {
                match message {
                    Message::Text(text) => {
                        if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                            shared.received.lock().push(value.clone());
                            local.lock().push(value);
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            closed.store(true, Ordering::SeqCst);
        })
    };

    let mut cursor = 0usize;
    for step in script {
        match step {
            Step::Send(value) => {
                if sink.send(Message::Text(value.to_string().into())).await.is_err() {
                    break;
                }
            }
            Step::SendRaw(raw) => {
                if sink.send(Message::Text(raw.into())).await.is_err() {
                    break;
                }
            }
            Step::WaitFor(event_type) => {
                let _ = poll_until(|| {
                    let seen = local.lock();
                    match seen[cursor..].iter().position(|v| v["type"] == event_type) {
                        Some(offset) => {
                            cursor += offset + 1;
                            true
                        }
                        None => closed.load(Ordering::SeqCst),
                    }
                })
                .await;
            }
            Step::Sleep(d) => tokio::time::sleep(d).await,
            Step::Close => {
                let _ = sink.close().await;
                let _ = reader.await;
                return;
            }
            Step::Drop => {
                reader.abort();
                let _ = reader.await;
                return;
            }
            Step::Stall => {
                reader.abort();
                let _ = reader.await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return;
            }
            Step::RejectHandshake => {}
        }
    }
    let _ = reader.await;
}
