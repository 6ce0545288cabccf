//! WebSocket transport session
//!
//! Owns one client socket: performs the upgrade, routes the request path to
//! a channel, pumps text frames into the [`Connection`], runs the keepalive
//! timer, and reports disconnection back to the hub.
//!
//! Outbound frames go through an unbounded queue drained by a writer task,
//! so [`Upstream::send`] never blocks while a channel is locked.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::registry::{ChannelRegistry, RegistryError};
use crate::server::config::ServerConfig;
use crate::session::{Connection, Upstream};

/// How long the writer gets to flush queued frames after the session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upstream backed by the session's writer queue
struct WsUpstream {
    tx: mpsc::UnboundedSender<Message>,
    closing: AtomicBool,
    closed: Notify,
}

impl WsUpstream {
    fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            tx,
            closing: AtomicBool::new(false),
            closed: Notify::new(),
        }
    }

    fn ping(&self, payload: Vec<u8>) {
        if !self.closing.load(Ordering::Acquire) {
            let _ = self.tx.send(Message::Ping(payload.into()));
        }
    }

    /// Queue a close frame and wake the read loop, once
    fn close_with(&self, code: CloseCode, reason: &'static str) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
        self.closed.notify_one();
    }
}

impl Upstream for WsUpstream {
    fn send(&self, frame: &str) {
        if !self.closing.load(Ordering::Acquire) {
            let _ = self.tx.send(Message::text(frame.to_owned()));
        }
    }

    fn close(&self) {
        self.close_with(CloseCode::Normal, "");
    }
}

/// Ping/pong bookkeeping
///
/// Any inbound frame pushes the next ping out by `ping_interval`. Once a
/// ping is outstanding, only a pong echoing its payload (or other inbound
/// traffic) clears it; otherwise the session times out after `pong_timeout`.
#[derive(Debug)]
struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
    deadline: Instant,
    pending: Option<Vec<u8>>,
}

impl Keepalive {
    fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
            deadline: Instant::now() + ping_interval,
            pending: None,
        }
    }

    fn deadline(&self) -> Instant {
        self.deadline
    }

    fn reset(&mut self) {
        self.pending = None;
        self.deadline = Instant::now() + self.ping_interval;
    }

    /// Called when the deadline passes
    ///
    /// Returns the payload of the ping to send, or `None` if the previous
    /// ping went unanswered.
    fn expire(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_some() {
            return None;
        }

        let payload = ping_payload();
        self.pending = Some(payload.clone());
        self.deadline = Instant::now() + self.pong_timeout;
        Some(payload)
    }

    fn on_pong(&mut self, data: &[u8]) {
        if self.pending.as_deref() == Some(data) {
            self.reset();
        }
    }
}

/// Current Unix time in seconds, as ASCII
fn ping_payload() -> Vec<u8> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
        .to_string()
        .into_bytes()
}

/// Extract the channel name from a request path of the form `/<channel>`
fn channel_from_path(path: &str) -> std::result::Result<String, RegistryError> {
    let name = path.strip_prefix('/').unwrap_or(path);
    ChannelRegistry::canonical_channel_name(name).map(|_| name.to_owned())
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Not Found".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn websocket_config(config: &ServerConfig) -> WebSocketConfig {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);
    ws_config.max_frame_size = Some(config.max_message_size);
    ws_config
}

/// Serve one accepted TCP connection until the client goes away
pub(crate) async fn run_session(
    socket: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<ChannelRegistry>,
    config: Arc<ServerConfig>,
) -> Result<()> {
    let mut requested = None;

    let ws = accept_hdr_async_with_config(
        socket,
        |req: &Request, resp: Response| match channel_from_path(req.uri().path()) {
            Ok(name) => {
                requested = Some(name);
                Ok(resp)
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "Upgrade refused");
                Err(not_found())
            }
        },
        Some(websocket_config(&config)),
    )
    .await?;

    let Some(channel_name) = requested else {
        return Ok(());
    };

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let upstream = Arc::new(WsUpstream::new(tx));

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if let Err(e) = sink.send(msg).await {
                tracing::debug!(error = %e, "Sink send error; writer task exiting");
                break;
            }
            if is_close {
                break;
            }
        }
    });

    let mut conn = registry.connection(&channel_name, upstream.clone()).await?;
    let conn_id = conn.id();

    tracing::info!(
        conn_id = %conn_id,
        peer = %peer_addr,
        channel = conn.channel_name().unwrap_or_default(),
        "Session opened"
    );

    let mut keepalive = Keepalive::new(config.ping_interval, config.pong_timeout);

    loop {
        tokio::select! {
            _ = upstream.closed.notified() => {
                tracing::debug!(conn_id = %conn_id, "Closed by hub");
                break;
            }
            _ = tokio::time::sleep_until(keepalive.deadline()) => {
                match keepalive.expire() {
                    Some(payload) => upstream.ping(payload),
                    None => {
                        tracing::warn!(conn_id = %conn_id, peer = %peer_addr, "Ping timeout");
                        upstream.close_with(CloseCode::Away, "Ping timeout");
                        break;
                    }
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    keepalive.reset();
                    conn.message(&text).await;
                }
                Some(Ok(Message::Pong(data))) => keepalive.on_pong(&data[..]),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => keepalive.reset(),
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Read error");
                    break;
                }
            }
        }
    }

    conn.close().await;
    drop(upstream);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    tracing::info!(conn_id = %conn_id, peer = %peer_addr, "Session closed");

    Ok(())
}
