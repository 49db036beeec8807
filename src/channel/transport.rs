//! Notice channel transport.
//!
//! The [`Transport`] trait is the seam between the channel runner and the
//! network. [`WsTransport`] is the production implementation on top of
//! `tokio-tungstenite`; tests substitute a scripted transport.
//!
//! A transport run is one connection attempt: it reports `Connected` once the
//! handshake completes, forwards every text frame, and returns the
//! [`Closure`] describing how the connection ended. The runner aborts the
//! run task to force-close, so implementations need no shutdown signal.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::cookie::{CookieStore, Jar};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::constants::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_UNAUTHORIZED};

/// Concrete WebSocket stream type.
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Events a transport reports while a connection attempt is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Connected,
    /// Text payload received.
    Message(String),
    /// Non-fatal error worth logging. The run still ends with a [`Closure`].
    Error(String),
}

/// How a connection attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason, empty when the server sent none.
    pub reason: String,
}

impl Closure {
    /// Closure with the given code and reason.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Connection dropped without a close frame, or never came up.
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "")
    }
}

/// Sink for events of one connection attempt.
///
/// Each attempt gets its own generation number so the runner can drop events
/// that arrive from a socket it has already abandoned.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Report an event. Silently dropped once the runner is gone.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send((self.generation, event));
    }

    /// Generation of the attempt this sink belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// One connection attempt to the notice endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connect to `url`, forward events until the connection ends, then
    /// return how it ended.
    ///
    /// Handshake failures emit a [`TransportEvent::Error`] and return
    /// [`Closure::abnormal`], except an HTTP 401 or 403 answer, which ends
    /// with [`CLOSE_UNAUTHORIZED`].
    async fn run(&self, url: &str, events: &TransportEvents) -> Closure;
}

/// WebSocket transport.
///
/// With a cookie jar attached, the cookies it holds for the endpoint are sent
/// with every handshake, read fresh on each attempt.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    headers: Vec<(String, String)>,
    cookies: Option<Arc<Jar>>,
}

impl WsTransport {
    /// Transport without extra handshake headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header sent with every handshake (for example `X-API-Key`).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send the login session's cookies with every handshake.
    #[must_use]
    pub fn with_cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// `Cookie` header value for `url`, if the jar holds any matching cookie.
    fn cookie_header(&self, url: &str) -> Option<String> {
        let jar = self.cookies.as_ref()?;
        let url = reqwest::Url::parse(&ws_to_http_scheme(url)).ok()?;
        let value = jar.cookies(&url)?;
        value.to_str().ok().map(str::to_string)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn run(&self, url: &str, events: &TransportEvents) -> Closure {
        let url = http_to_ws_scheme(url);
        let cookie = self.cookie_header(&url);
        let mut headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(cookie) = cookie.as_deref() {
            headers.push(("Cookie", cookie));
        }

        let (mut writer, mut reader) = match connect(&url, &headers).await {
            Ok(halves) => halves,
            Err(e) => {
                log::debug!("[NoticeChannel] Connect to {url} failed: {e:#}");
                events.emit(TransportEvent::Error(format!("{e:#}")));
                return match rejected_status(&e) {
                    Some(status @ (401 | 403)) => Closure::new(
                        CLOSE_UNAUTHORIZED,
                        format!("Handshake rejected with HTTP {status}"),
                    ),
                    _ => Closure::abnormal(),
                };
            }
        };

        events.emit(TransportEvent::Connected);

        loop {
            match reader.recv().await {
                Some(Ok(WsMessage::Text(text))) => events.emit(TransportEvent::Message(text)),
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => events.emit(TransportEvent::Message(text)),
                    Err(_) => log::debug!("[NoticeChannel] Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = writer.send_pong(data).await {
                        events.emit(TransportEvent::Error(format!("{e:#}")));
                        return Closure::abnormal();
                    }
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    return Closure::new(code, reason);
                }
                Some(Err(e)) => {
                    events.emit(TransportEvent::Error(format!("{e:#}")));
                    return Closure::abnormal();
                }
                None => return Closure::abnormal(),
            }
        }
    }
}

/// Received WebSocket message.
#[derive(Debug)]
enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Close { code: u16, reason: String },
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("WebSocket send_pong failed")
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Next message, `None` when the stream ends. Pongs and raw frames are
    /// skipped.
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(tungstenite::Message::Text(text)) => {
                    return Some(Ok(WsMessage::Text(text.to_string())));
                }
                Ok(tungstenite::Message::Binary(data)) => {
                    return Some(Ok(WsMessage::Binary(data.to_vec())));
                }
                Ok(tungstenite::Message::Ping(data)) => {
                    return Some(Ok(WsMessage::Ping(data.to_vec())));
                }
                Ok(tungstenite::Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map_or((CLOSE_NO_STATUS, String::new()), |cf| {
                            (cf.code.into(), cf.reason.to_string())
                        });
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Ok(tungstenite::Message::Pong(_) | tungstenite::Message::Frame(_)) => {}
                Err(e) => return Some(Err(anyhow::anyhow!("WebSocket read error: {e}"))),
            }
        }
    }
}

/// Open a WebSocket to `url`, inserting each `(name, value)` header into the
/// handshake request.
async fn connect(url: &str, headers: &[(&str, &str)]) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    for &(name, value) in headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name: {name}"))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .with_context(|| format!("invalid header value for {name}"))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .context("WebSocket connect failed")?;

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// HTTP status of a handshake the server answered without upgrading.
fn rejected_status(e: &anyhow::Error) -> Option<u16> {
    match e.downcast_ref::<tungstenite::Error>() {
        Some(tungstenite::Error::Http(response)) => Some(response.status().as_u16()),
        _ => None,
    }
}

/// Convert an HTTP(S) URL to the matching WS(S) scheme.
///
/// `ws://` and `wss://` pass through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Convert a WS(S) URL back to HTTP(S), for cookie matching.
fn ws_to_http_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme() {
        assert_eq!(
            http_to_ws_scheme("https://console.example.com/api/v1/ws/notices"),
            "wss://console.example.com/api/v1/ws/notices"
        );
        assert_eq!(http_to_ws_scheme("http://localhost:8080/ws"), "ws://localhost:8080/ws");
        assert_eq!(http_to_ws_scheme("wss://already.example"), "wss://already.example");
    }

    #[test]
    fn test_cookie_header_matches_endpoint() {
        let jar = Arc::new(Jar::default());
        let origin = reqwest::Url::parse("http://console.example.com/").expect("url");
        jar.add_cookie_str("session=abc; Path=/", &origin);
        let transport = WsTransport::new().with_cookie_jar(jar);

        assert_eq!(
            transport
                .cookie_header("ws://console.example.com/manager/v2/notices/ws")
                .as_deref(),
            Some("session=abc")
        );
        assert_eq!(transport.cookie_header("ws://other.example.com/ws"), None);
        assert_eq!(WsTransport::new().cookie_header("ws://console.example.com/ws"), None);
    }

    #[test]
    fn test_ws_to_http_scheme() {
        assert_eq!(ws_to_http_scheme("wss://a.example/ws"), "https://a.example/ws");
        assert_eq!(ws_to_http_scheme("ws://a.example/ws"), "http://a.example/ws");
    }

    #[test]
    fn test_events_carry_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = TransportEvents::new(7, tx);
        events.emit(TransportEvent::Connected);
        assert_eq!(events.generation(), 7);
        assert_eq!(rx.try_recv().ok(), Some((7, TransportEvent::Connected)));
    }

    #[test]
    fn test_emit_after_runner_gone_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        TransportEvents::new(1, tx).emit(TransportEvent::Message("x".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_closes_abnormally() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = TransportEvents::new(1, tx);
        // Port 9 (discard) on loopback is not listening in test environments
        let closure = WsTransport::new().run("ws://127.0.0.1:9/ws", &events).await;
        assert_eq!(closure, Closure::abnormal());
        assert!(matches!(rx.try_recv(), Ok((1, TransportEvent::Error(_)))));
    }

    #[tokio::test]
    async fn test_invalid_header_fails_before_connecting() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = TransportEvents::new(2, tx);
        let transport = WsTransport::new().with_header("bad header", "v");
        let closure = transport.run("ws://127.0.0.1:9/ws", &events).await;
        assert_eq!(closure.code, 1006);
        match rx.try_recv() {
            Ok((2, TransportEvent::Error(msg))) => assert!(msg.contains("invalid header name")),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
