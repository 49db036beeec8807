//! Integration tests for the notice channel over a real WebSocket.
//!
//! A local tokio-tungstenite server plays the console backend; the channel
//! runs with the production `WsTransport`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use reqwest::cookie::Jar;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_async, accept_hdr_async};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use mesh_console::channel::{ChannelStatus, NoticeChannel, RetryPolicy, WsTransport};
use mesh_console::state::{AppState, SharedAppState, Tenant, User};

const WAIT: Duration = Duration::from_secs(5);

fn login_admin(state: &AppState) {
    let user = User {
        user_id: "u-1".to_string(),
        is_admin: true,
        ..User::default()
    };
    let tenant = Tenant {
        id: "t-1".to_string(),
        name: "Acme".to_string(),
        namespace: "acme".to_string(),
    };
    state.session.login(user, tenant, "");
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        delay: Duration::from_millis(200),
        failure_threshold: 10,
    }
}

async fn wait_for_notices(state: &SharedAppState, count: usize) {
    let mut rx = state.notices.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|list| list.len() >= count))
        .await
        .expect("notices arrive in time")
        .expect("store alive");
}

#[tokio::test]
async fn test_notices_arrive_newest_first() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::text(
            r#"{"id":"n1","created_at":"2024-01-01T00:00:00Z","text":"hi"}"#,
        ))
        .await
        .unwrap();
        ws.send(Message::text("{not-json")).await.unwrap();
        ws.send(Message::text(r#"{"id":"n2","node_info":{"host_name":"gw-1"}}"#))
            .await
            .unwrap();
        // Hold the connection open until the test is done
        let _ = done_rx.await;
    });

    let state = AppState::shared();
    login_admin(&state);
    let handle = NoticeChannel::spawn(
        format!("http://{addr}/ws"),
        fast_policy(),
        Arc::clone(&state),
        Arc::new(WsTransport::new()),
    );

    wait_for_notices(&state, 2).await;

    let notices = state.notices.snapshot();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0], json!({"id": "n2", "nodeInfo": {"hostName": "gw-1"}}));
    assert_eq!(
        notices[1],
        json!({"id": "n1", "createdAt": "2024-01-01T00:00:00Z", "text": "hi"})
    );
    assert_eq!(handle.status(), ChannelStatus::Open);
    assert_eq!(state.notices.status_color(), Some("green"));

    handle.shutdown().await;
    let _ = done_tx.send(());
    server.await.unwrap();
}

#[tokio::test]
async fn test_policy_close_shows_reason_and_stops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: "session limit reached".into(),
        })))
        .await
        .unwrap();
        // Drain until the client acknowledges the close
        while let Some(Ok(_)) = ws.next().await {}

        // No reconnect may follow
        tokio::time::timeout(Duration::from_secs(1), listener.accept())
            .await
            .is_err()
    });

    let state = AppState::shared();
    login_admin(&state);
    let handle = NoticeChannel::spawn(
        format!("ws://{addr}/ws"),
        fast_policy(),
        Arc::clone(&state),
        Arc::new(WsTransport::new()),
    );

    let mut alert_rx = state.alert.subscribe();
    tokio::time::timeout(WAIT, alert_rx.wait_for(Option::is_some))
        .await
        .expect("alert in time")
        .expect("slot alive");

    let alert = state.alert.get().unwrap();
    assert_eq!(
        alert.message,
        "Server notice connection is closed. session limit reached"
    );
    assert!(server.await.unwrap(), "channel reconnected after a policy close");
    assert_eq!(handle.status(), ChannelStatus::Closed);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_transient_close_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        // First connection: close without a status code
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Close(None)).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}

        // Second connection: deliver a notice
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::text(r#"{"id":"after_retry"}"#)).await.unwrap();
        let _ = done_rx.await;
    });

    let state = AppState::shared();
    login_admin(&state);
    let handle = NoticeChannel::spawn(
        format!("ws://{addr}/ws"),
        fast_policy(),
        Arc::clone(&state),
        Arc::new(WsTransport::new()),
    );

    wait_for_notices(&state, 1).await;
    assert_eq!(state.notices.snapshot()[0], json!({"id": "after_retry"}));
    assert!(state.alert.get().is_none());

    handle.shutdown().await;
    let _ = done_tx.send(());
    server.await.unwrap();
}

#[tokio::test]
async fn test_logout_closes_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::text(r#"{"id":"n1"}"#)).await.unwrap();
        // Ends once the client drops the socket
        while let Some(Ok(_)) = ws.next().await {}
    });

    let state = AppState::shared();
    login_admin(&state);
    let handle = NoticeChannel::spawn(
        format!("ws://{addr}/ws"),
        fast_policy(),
        Arc::clone(&state),
        Arc::new(WsTransport::new()),
    );
    wait_for_notices(&state, 1).await;

    state.reset_session();

    tokio::time::timeout(WAIT, server)
        .await
        .expect("server sees the socket go away")
        .unwrap();
    let mut status_rx = handle.subscribe_status();
    tokio::time::timeout(WAIT, status_rx.wait_for(|s| *s == ChannelStatus::Closed))
        .await
        .expect("closed in time")
        .expect("channel alive");
    assert!(state.notices.is_empty());

    handle.shutdown().await;
}

/// Handshake check that only lets through requests carrying the session cookie.
#[allow(clippy::result_large_err)]
fn require_session_cookie(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    let has_cookie = request
        .headers()
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split("; ").any(|c| c == "session=s3cret"));
    if has_cookie {
        Ok(response)
    } else {
        let mut rejection = ErrorResponse::new(None);
        *rejection.status_mut() = StatusCode::UNAUTHORIZED;
        Err(rejection)
    }
}

#[tokio::test]
async fn test_handshake_sends_session_cookie() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_hdr_async(stream, require_session_cookie)
            .await
            .unwrap();
        ws.send(Message::text(r#"{"id":"with_cookie"}"#)).await.unwrap();
        let _ = done_rx.await;
    });

    let jar = Arc::new(Jar::default());
    let origin = reqwest::Url::parse(&format!("http://{addr}/")).unwrap();
    jar.add_cookie_str("session=s3cret; Path=/", &origin);

    let state = AppState::shared();
    login_admin(&state);
    let handle = NoticeChannel::spawn(
        format!("ws://{addr}/ws"),
        fast_policy(),
        Arc::clone(&state),
        Arc::new(WsTransport::new().with_cookie_jar(jar)),
    );

    wait_for_notices(&state, 1).await;
    assert_eq!(state.notices.snapshot()[0], json!({"id": "with_cookie"}));

    handle.shutdown().await;
    let _ = done_tx.send(());
    server.await.unwrap();
}

#[tokio::test]
async fn test_rejected_handshake_is_unauthorized_not_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        assert!(accept_hdr_async(stream, require_session_cookie).await.is_err());

        // No reconnect may follow
        tokio::time::timeout(Duration::from_secs(1), listener.accept())
            .await
            .is_err()
    });

    let state = AppState::shared();
    login_admin(&state);
    let handle = NoticeChannel::spawn(
        format!("ws://{addr}/ws"),
        fast_policy(),
        Arc::clone(&state),
        Arc::new(WsTransport::new().with_cookie_jar(Arc::new(Jar::default()))),
    );

    let mut alert_rx = state.alert.subscribe();
    tokio::time::timeout(WAIT, alert_rx.wait_for(Option::is_some))
        .await
        .expect("alert in time")
        .expect("slot alive");

    assert_eq!(
        state.alert.get().unwrap().message,
        "Unauthorized for server connection."
    );
    assert!(server.await.unwrap(), "channel retried a rejected handshake");
    assert_eq!(handle.status(), ChannelStatus::Closed);

    handle.shutdown().await;
}
