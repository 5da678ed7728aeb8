// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! WebSocket session to the workshop coordinator.
//!
//! The client never blocks the controller: connecting, reading and writing
//! run in spawned tasks that report back over a channel, tagged with the id
//! of the connection instance they belong to. Reports from superseded
//! instances are ignored, so every instance goes DISCONNECTED exactly once.

use std::collections::VecDeque;
use std::future;
use std::time::Duration;

use atelier_core::{ExponentialBackoff, Outbox, ReconnectBackoff};
use atelier_protocol::{encode_message, parse_frame, InboundMessage, OutboundMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frames a connection's writer task may hold before sends are refused.
const WRITER_QUEUE: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("invalid session url: {0}")]
    InvalidUrl(String),

    #[error("gave up reconnecting after {0} attempt(s)")]
    GaveUp(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Progress reported by [`SessionClient::next_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Connected,
    Disconnected { reason: String },
    Message(InboundMessage),
    /// The retry policy is exhausted; no further attempts will be made.
    GaveUp { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub url: String,
    pub auto_reconnect: bool,
    pub connect_timeout: Duration,
    /// Capacity of the reliable buffer used while disconnected.
    pub max_queue: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Fraction in `[0, 1]` by which a reconnect delay may be shortened.
    pub backoff_jitter: f64,
    pub max_attempts: Option<u32>,
}

impl SessionSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            auto_reconnect: true,
            connect_timeout: Duration::from_secs(5),
            max_queue: 64,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            backoff_jitter: 0.2,
            max_attempts: None,
        }
    }
}

/// Bounded FIFO of encoded frames waiting for a connection.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: VecDeque<String>,
    evicted: u64,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `frame`, evicting the oldest entry once `max_queue` is reached.
    /// Returns the evicted frame, if any.
    pub fn push(&mut self, frame: String, max_queue: usize) -> Option<String> {
        if max_queue == 0 {
            self.evicted += 1;
            warn!("Outbound buffer has no capacity, dropping message");
            return Some(frame);
        }
        let mut evicted = None;
        while self.frames.len() >= max_queue {
            evicted = self.frames.pop_front();
            self.evicted += 1;
            warn!(
                "Outbound buffer full ({} message(s)), evicting oldest",
                max_queue
            );
        }
        self.frames.push_back(frame);
        evicted
    }

    pub fn drain(&mut self) -> impl Iterator<Item = String> + '_ {
        self.frames.drain(..)
    }

    pub fn pop(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    /// Put a frame back at the head, ahead of everything buffered.
    fn requeue(&mut self, frame: String) {
        self.frames.push_front(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

enum Internal {
    Connected { conn: u64, stream: Box<WsStream> },
    ConnectFailed { conn: u64, reason: String },
    Frame { conn: u64, text: String },
    Closed { conn: u64, reason: String },
}

struct Connection {
    writer: mpsc::Sender<String>,
    reader_task: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The writer task sends a close frame once its channel is dropped.
        self.reader_task.abort();
    }
}

/// Validate a coordinator URL and return it in canonical `ws://` form.
///
/// Accepts `ws://host[:port][/path]` or a bare `host[:port][/path]`.
pub fn parse_session_url(url: &str) -> Result<String, SessionError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidUrl("url is empty".into()));
    }

    let rest = match trimmed.split_once("://") {
        Some(("ws", rest)) => rest,
        Some(("wss", _)) => {
            return Err(SessionError::InvalidUrl(
                "wss:// is not supported by this build".into(),
            ))
        }
        Some((scheme, _)) => {
            return Err(SessionError::InvalidUrl(format!(
                "unsupported scheme '{scheme}'"
            )))
        }
        None => trimmed,
    };

    let authority = rest.split('/').next().unwrap_or("");
    validate_authority(authority)?;
    Ok(format!("ws://{rest}"))
}

fn validate_authority(authority: &str) -> Result<(), SessionError> {
    if let Some(inner) = authority.strip_prefix('[') {
        let closing = inner.find(']').ok_or_else(|| {
            SessionError::InvalidUrl("missing closing ']' for IPv6 host".into())
        })?;
        if closing == 0 {
            return Err(SessionError::InvalidUrl("host is empty".into()));
        }
        let remainder = &inner[closing + 1..];
        if remainder.is_empty() {
            return Ok(());
        }
        return match remainder.strip_prefix(':') {
            Some(port) => parse_port(port).map(|_| ()),
            None => Err(SessionError::InvalidUrl(
                "expected ':<port>' after ']'".into(),
            )),
        };
    }

    match authority.rsplit_once(':') {
        Some(_) if authority.matches(':').count() > 1 => Err(SessionError::InvalidUrl(
            "IPv6 host must be bracketed like [::1]:8765".into(),
        )),
        Some((host, _)) if host.is_empty() => {
            Err(SessionError::InvalidUrl("host is empty".into()))
        }
        Some((_, port)) => parse_port(port).map(|_| ()),
        None if authority.is_empty() => Err(SessionError::InvalidUrl("host is empty".into())),
        None => Ok(()),
    }
}

fn parse_port(port: &str) -> Result<u16, SessionError> {
    match port.parse::<u16>() {
        Ok(0) => Err(SessionError::InvalidUrl("port 0 is not allowed".into())),
        Ok(port) => Ok(port),
        Err(_) => Err(SessionError::InvalidUrl(format!("invalid port '{port}'"))),
    }
}

pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Persistent WebSocket client with buffered reliable delivery.
pub struct SessionClient {
    settings: SessionSettings,
    state: SessionState,
    backoff: ReconnectBackoff,
    buffer: OutboundQueue,
    next_conn: u64,
    current: u64,
    connection: Option<Connection>,
    connecting: Option<JoinHandle<()>>,
    reconnect_at: Option<Instant>,
    updates: VecDeque<SessionUpdate>,
    events_tx: mpsc::UnboundedSender<Internal>,
    events_rx: mpsc::UnboundedReceiver<Internal>,
    closed: bool,
}

impl SessionClient {
    pub fn new(settings: SessionSettings) -> Result<Self, SessionError> {
        let url = parse_session_url(&settings.url)?;
        let mut policy = ExponentialBackoff::new(settings.backoff_base, settings.backoff_max);
        if let Some(max) = settings.max_attempts {
            policy = policy.with_max_attempts(max);
        }
        let backoff = ReconnectBackoff::new(policy, settings.backoff_jitter);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            settings: SessionSettings { url, ..settings },
            state: SessionState::Disconnected,
            backoff,
            buffer: OutboundQueue::new(),
            next_conn: 0,
            current: 0,
            connection: None,
            connecting: None,
            reconnect_at: None,
            updates: VecDeque::new(),
            events_tx,
            events_rx,
            closed: false,
        })
    }

    pub fn url(&self) -> &str {
        &self.settings.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of reliable messages waiting for a connection.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn evicted(&self) -> u64 {
        self.buffer.evicted()
    }

    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Begin connecting. Must be called from within the runtime.
    pub fn start(&mut self) {
        if self.closed || self.state != SessionState::Disconnected {
            return;
        }
        self.start_connect();
    }

    fn start_connect(&mut self) {
        self.next_conn += 1;
        let conn = self.next_conn;
        self.current = conn;
        self.state = SessionState::Connecting;
        self.reconnect_at = None;

        let url = self.settings.url.clone();
        let timeout = self.settings.connect_timeout;
        let events = self.events_tx.clone();
        info!("Session: connecting to {}", url);
        self.connecting = Some(tokio::spawn(async move {
            let event = match time::timeout(timeout, connect_async(url.as_str())).await {
                Ok(Ok((stream, _))) => Internal::Connected {
                    conn,
                    stream: Box::new(stream),
                },
                Ok(Err(e)) => Internal::ConnectFailed {
                    conn,
                    reason: e.to_string(),
                },
                Err(_) => Internal::ConnectFailed {
                    conn,
                    reason: format!("timed out after {:?}", timeout),
                },
            };
            let _ = events.send(event);
        }));
    }

    /// Wait for the next session update. Cancel-safe.
    ///
    /// Reconnect attempts are started from here, so the owner must keep
    /// polling this while the session is in use.
    pub async fn next_update(&mut self) -> SessionUpdate {
        loop {
            if let Some(update) = self.updates.pop_front() {
                return update;
            }
            tokio::select! {
                // Never `None`: the client holds a sender.
                Some(event) = self.events_rx.recv() => {
                    if let Some(update) = self.handle_event(event) {
                        return update;
                    }
                }
                _ = sleep_until_opt(self.reconnect_at) => {
                    self.start_connect();
                }
            }
        }
    }

    fn handle_event(&mut self, event: Internal) -> Option<SessionUpdate> {
        match event {
            Internal::Connected { conn, stream } => {
                if conn != self.current || self.state != SessionState::Connecting {
                    debug!("Session: dropping stale connection #{}", conn);
                    return None;
                }
                self.connecting = None;
                self.attach(conn, *stream);
                Some(SessionUpdate::Connected)
            }
            Internal::ConnectFailed { conn, reason } => {
                if conn != self.current || self.state != SessionState::Connecting {
                    return None;
                }
                self.connecting = None;
                self.state = SessionState::Disconnected;
                warn!("Session: connect to {} failed: {}", self.settings.url, reason);
                self.schedule_reconnect();
                self.updates.pop_front()
            }
            Internal::Frame { conn, text } => {
                if conn != self.current || self.state != SessionState::Connected {
                    return None;
                }
                match parse_frame(&text) {
                    Ok(message) => Some(SessionUpdate::Message(message)),
                    Err(e) => {
                        warn!("Session: discarding malformed frame: {}", e);
                        None
                    }
                }
            }
            Internal::Closed { conn, reason } => {
                if conn != self.current || self.state != SessionState::Connected {
                    return None;
                }
                self.connection = None;
                self.state = SessionState::Disconnected;
                warn!("Session: connection lost: {}", reason);
                self.schedule_reconnect();
                Some(SessionUpdate::Disconnected { reason })
            }
        }
    }

    fn attach(&mut self, conn: u64, stream: WsStream) {
        let (sink, stream) = stream.split();
        let (writer, writer_rx) = mpsc::channel(WRITER_QUEUE);
        tokio::spawn(write_loop(conn, sink, writer_rx, self.events_tx.clone()));
        let reader_task = tokio::spawn(read_loop(conn, stream, self.events_tx.clone()));

        let flushed = flush_into(&writer, &mut self.buffer);
        self.connection = Some(Connection {
            writer,
            reader_task,
        });
        self.state = SessionState::Connected;
        self.backoff.reset();
        info!(
            "Session: connected to {} (#{}, {} buffered message(s) flushed)",
            self.settings.url, conn, flushed
        );
    }

    fn schedule_reconnect(&mut self) {
        if self.closed || !self.settings.auto_reconnect {
            return;
        }
        match self.backoff.next() {
            Some(step) => {
                info!(
                    "Session: reconnecting in {:?} (attempt {})",
                    step.delay, step.attempt
                );
                self.reconnect_at = Some(Instant::now() + step.delay);
            }
            None => {
                let attempts = self.backoff.attempts();
                warn!("Session: giving up after {} attempt(s)", attempts);
                self.updates.push_back(SessionUpdate::GaveUp { attempts });
            }
        }
    }

    /// Hand `frame` to the writer task. Frames still buffered go first; if
    /// any remain, or the writer is full or gone, the frame comes back.
    fn transmit(&mut self, frame: String) -> Result<(), String> {
        let writer = match (&self.connection, self.state) {
            (Some(connection), SessionState::Connected) => &connection.writer,
            _ => return Err(frame),
        };
        flush_into(writer, &mut self.buffer);
        if !self.buffer.is_empty() {
            return Err(frame);
        }
        writer.try_send(frame).map_err(|e| match e {
            TrySendError::Full(frame) => {
                warn!("Session: writer backlog full ({} frame(s))", WRITER_QUEUE);
                frame
            }
            TrySendError::Closed(frame) => frame,
        })
    }

    fn encode(message: &OutboundMessage) -> Option<String> {
        match encode_message(message) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Session: cannot encode outbound message: {}", e);
                None
            }
        }
    }

    /// Send now or drop. Returns whether the message was handed to the
    /// connection.
    pub fn send_best_effort(&mut self, payload: Value) -> bool {
        let Some(frame) = Self::encode(&OutboundMessage::ephemeral(payload)) else {
            return false;
        };
        match self.transmit(frame) {
            Ok(()) => true,
            Err(_) => {
                debug!("Session: cannot send now, dropping best-effort message");
                false
            }
        }
    }

    /// Send now, or buffer up to `max_queue` messages until the next
    /// connection. Returns whether the message was sent or buffered.
    pub fn send_reliable_buffered(&mut self, payload: Value, max_queue: usize) -> bool {
        if self.closed {
            return false;
        }
        let Some(frame) = Self::encode(&OutboundMessage::reliable(payload)) else {
            return false;
        };
        match self.transmit(frame) {
            Ok(()) => true,
            Err(frame) => {
                self.buffer.push(frame, max_queue);
                max_queue > 0
            }
        }
    }

    /// Close the session and stop reconnecting. Idempotent.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.reconnect_at = None;
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        self.connection = None;
        self.buffer.clear();
        self.updates.clear();
        self.state = SessionState::Disconnected;
        info!("Session: closed");
        true
    }
}

impl Outbox for SessionClient {
    fn send(&mut self, message: OutboundMessage) {
        if message.is_reliable() {
            let max_queue = self.settings.max_queue;
            self.send_reliable_buffered(message.payload, max_queue);
        } else {
            self.send_best_effort(message.payload);
        }
    }
}

/// Move buffered frames into `writer` until it is full or closed.
/// Returns how many were moved.
fn flush_into(writer: &mpsc::Sender<String>, buffer: &mut OutboundQueue) -> usize {
    let mut moved = 0;
    while let Some(frame) = buffer.pop() {
        if let Err(TrySendError::Full(frame) | TrySendError::Closed(frame)) = writer.try_send(frame)
        {
            buffer.requeue(frame);
            break;
        }
        moved += 1;
    }
    moved
}

async fn write_loop(
    conn: u64,
    mut sink: SplitSink<WsStream, Message>,
    mut frames: mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<Internal>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = sink.send(Message::Text(frame.into())).await {
            let _ = events.send(Internal::Closed {
                conn,
                reason: format!("write failed: {e}"),
            });
            return;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    conn: u64,
    mut stream: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<Internal>,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let text = text.to_string();
                if events.send(Internal::Frame { conn, text }).is_err() {
                    return;
                }
            }
            Some(Ok(Message::Binary(_))) => debug!("Session: ignoring binary frame"),
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => format!("closed by peer ({})", frame.code),
                    None => "closed by peer".to_string(),
                }
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break format!("read failed: {e}"),
            None => break "stream ended".to_string(),
        }
    };
    let _ = events.send(Internal::Closed { conn, reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn offline_client(max_queue: usize) -> SessionClient {
        let mut settings = SessionSettings::new("ws://127.0.0.1:9");
        settings.max_queue = max_queue;
        SessionClient::new(settings).expect("valid url")
    }

    #[test]
    fn parse_accepts_ws_and_bare_hosts() {
        assert_eq!(
            parse_session_url("ws://10.0.0.5:8765/node").unwrap(),
            "ws://10.0.0.5:8765/node"
        );
        assert_eq!(
            parse_session_url(" coordinator.local:8765 ").unwrap(),
            "ws://coordinator.local:8765"
        );
        assert_eq!(parse_session_url("[::1]:8765").unwrap(), "ws://[::1]:8765");
    }

    #[test]
    fn parse_rejects_bad_urls() {
        for url in [
            "",
            "http://host:80",
            "wss://host",
            "ws://:8765",
            "ws://host:0",
            "ws://host:port",
            "::1:8765",
            "ws://[::1",
        ] {
            assert!(parse_session_url(url).is_err(), "accepted {url:?}");
        }
    }

    #[test]
    fn queue_evicts_oldest_on_overflow() {
        let mut queue = OutboundQueue::new();
        assert_eq!(queue.push("a".into(), 2), None);
        assert_eq!(queue.push("b".into(), 2), None);
        assert_eq!(queue.push("c".into(), 2), Some("a".into()));
        assert_eq!(queue.drain().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(queue.evicted(), 1);
    }

    #[tokio::test]
    async fn flush_stops_at_writer_capacity() {
        let (writer, mut frames) = mpsc::channel(2);
        let mut queue = OutboundQueue::new();
        for frame in ["a", "b", "c"] {
            queue.push(frame.into(), 8);
        }
        assert_eq!(flush_into(&writer, &mut queue), 2);
        assert_eq!(queue.len(), 1);

        assert_eq!(frames.recv().await.as_deref(), Some("a"));
        assert_eq!(flush_into(&writer, &mut queue), 1);
        assert!(queue.is_empty());
        assert_eq!(frames.recv().await.as_deref(), Some("b"));
        assert_eq!(frames.recv().await.as_deref(), Some("c"));

        drop(frames);
        queue.push("d".into(), 8);
        assert_eq!(flush_into(&writer, &mut queue), 0);
        assert_eq!(queue.pop().as_deref(), Some("d"));
    }

    #[test]
    fn reliable_is_buffered_while_disconnected() {
        let mut client = offline_client(3);
        for i in 0..4 {
            assert!(client.send_reliable_buffered(json!({ "seq": i }), 3));
        }
        assert_eq!(client.pending(), 3);
        assert_eq!(client.evicted(), 1);
        let buffered: Vec<_> = client.buffer.drain().collect();
        assert_eq!(buffered[0], r#"{"seq":1}"#);
        assert_eq!(buffered[2], r#"{"seq":3}"#);
    }

    #[test]
    fn best_effort_is_dropped_while_disconnected() {
        let mut client = offline_client(3);
        assert!(!client.send_best_effort(json!({ "type": "light", "value": 1 })));
        Outbox::send(
            &mut client,
            OutboundMessage::typed(atelier_protocol::MessageClass::Ephemeral, "light", json!(2)),
        );
        assert_eq!(client.pending(), 0);
        Outbox::send(&mut client, OutboundMessage::state_update("lost_state", "inactive"));
        assert_eq!(client.pending(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let mut client = offline_client(3);
        client.send_reliable_buffered(json!({ "a": 1 }), 3);
        assert!(client.close());
        assert!(!client.close());
        assert_eq!(client.pending(), 0);
        assert!(!client.send_reliable_buffered(json!({ "a": 2 }), 3));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connect_schedules_reconnect() {
        let mut settings = SessionSettings::new("ws://127.0.0.1:1");
        settings.backoff_base = Duration::from_secs(60);
        settings.backoff_max = Duration::from_secs(60);
        settings.backoff_jitter = 0.0;
        let mut client = SessionClient::new(settings).unwrap();
        client.start();
        assert_eq!(client.state(), SessionState::Connecting);

        let outcome =
            tokio::time::timeout(Duration::from_millis(300), client.next_update()).await;
        assert!(outcome.is_err(), "no update expected for a failed connect");
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(client.reconnect_at().is_some());
    }

    #[tokio::test]
    async fn gives_up_when_policy_is_exhausted() {
        let mut settings = SessionSettings::new("ws://127.0.0.1:1");
        settings.max_attempts = Some(0);
        let mut client = SessionClient::new(settings).unwrap();
        client.start();
        let update = tokio::time::timeout(Duration::from_secs(5), client.next_update())
            .await
            .expect("update");
        assert_eq!(update, SessionUpdate::GaveUp { attempts: 0 });
        assert!(client.reconnect_at().is_none());
    }

    async fn next(client: &mut SessionClient) -> SessionUpdate {
        tokio::time::timeout(Duration::from_secs(5), client.next_update())
            .await
            .expect("session update")
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn flushes_buffer_in_order_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

        let server = tokio::spawn(async move {
            // First connection: read one frame, then drop the socket.
            let (first, _) = listener.accept().await.expect("accept first");
            let mut ws = accept_async(first).await.expect("handshake first");
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            drop(ws);

            // Second connection: collect the flushed frames, then talk back.
            let (second, _) = listener.accept().await.expect("accept second");
            let mut ws = accept_async(second).await.expect("handshake second");
            for _ in 0..2 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    let _ = seen_tx.send(text.to_string());
                }
            }
            ws.send(Message::Text("{not json".into())).await.expect("send bad");
            ws.send(Message::Text(r#"{"start_system":true}"#.into()))
                .await
                .expect("send good");
            let _ = ws.next().await;
        });

        let mut settings = SessionSettings::new(format!("ws://{addr}"));
        settings.backoff_base = Duration::from_millis(10);
        settings.backoff_max = Duration::from_millis(50);
        let mut client = SessionClient::new(settings).unwrap();
        client.start();

        assert_eq!(next(&mut client).await, SessionUpdate::Connected);
        client.send_reliable_buffered(json!({ "seq": "a" }), 8);
        assert!(matches!(
            next(&mut client).await,
            SessionUpdate::Disconnected { .. }
        ));

        client.send_reliable_buffered(json!({ "seq": "b" }), 8);
        client.send_reliable_buffered(json!({ "seq": "c" }), 8);
        assert_eq!(client.pending(), 2);

        assert_eq!(next(&mut client).await, SessionUpdate::Connected);
        assert_eq!(client.pending(), 0);
        match next(&mut client).await {
            SessionUpdate::Message(msg) => assert!(msg.flag("start_system")),
            other => panic!("unexpected update {other:?}"),
        }

        let mut seen = Vec::new();
        while seen.len() < 3 {
            seen.push(seen_rx.recv().await.expect("server frame"));
        }
        assert_eq!(
            seen,
            vec![r#"{"seq":"a"}"#, r#"{"seq":"b"}"#, r#"{"seq":"c"}"#]
        );

        client.close();
        let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
    }
}
