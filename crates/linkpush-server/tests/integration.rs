//! End-to-end integration tests using a real WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use linkpush_core::SessionId;
use linkpush_server::config::ServerConfig;
use linkpush_server::server::LinkServer;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server on an ephemeral port.
async fn boot_server() -> (LinkServer, SocketAddr, JoinHandle<()>) {
    let config = ServerConfig::default(); // port 0 = auto-assign
    let server = LinkServer::new(config);
    let (addr, handle) = server.listen().await.unwrap();
    (server, addr, handle)
}

/// Connect, returning the stream and the assigned session id.
async fn connect(addr: SocketAddr, session_id: Option<&str>) -> (WsStream, String) {
    let url = match session_id {
        Some(id) => format!("ws://{addr}/ws?sessionId={id}"),
        None => format!("ws://{addr}/ws"),
    };
    let (mut ws, _) = connect_async(url).await.unwrap();
    let first = read_json(&mut ws).await;
    assert_eq!(first["type"], "sessionId");
    let id = first["data"].as_str().unwrap().to_owned();
    (ws, id)
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Assert no text message arrives within `QUIET`.
async fn expect_silence(ws: &mut WsStream) {
    let deadline = tokio::time::Instant::now() + QUIET;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected message: {text}"),
            Ok(Some(Ok(_))) => {}
            Ok(other) => panic!("stream ended: {other:?}"),
        }
    }
}

async fn submit(addr: SocketAddr, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/url"))
        .json(body)
        .send()
        .await
        .unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_session_id_sent_first() {
    let (server, addr, _handle) = boot_server().await;
    let (_ws, id) = connect(addr, None).await;

    assert!(!id.is_empty());
    assert!(server.sessions().contains(&SessionId::from(id.as_str())));
    wait_until(|| server.sessions().connected_count() == 1).await;
}

#[tokio::test]
async fn e2e_upgrade_sets_session_cookie() {
    let (_server, addr, _handle) = boot_server().await;
    let (mut ws, resp) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let cookie = resp
        .headers()
        .get("set-cookie")
        .expect("no cookie")
        .to_str()
        .unwrap()
        .to_owned();

    let first = read_json(&mut ws).await;
    let id = first["data"].as_str().unwrap();
    assert!(cookie.starts_with(&format!("sessionId={id}")));
}

#[tokio::test]
async fn e2e_cookie_resumes_session() {
    let (_server, addr, _handle) = boot_server().await;
    let (ws, id) = connect(addr, None).await;
    drop(ws);

    let mut req = format!("ws://{addr}/ws").into_client_request().unwrap();
    let _ = req.headers_mut().insert(
        "cookie",
        HeaderValue::from_str(&format!("sessionId={id}")).unwrap(),
    );
    let (mut ws, _) = connect_async(req).await.unwrap();
    let first = read_json(&mut ws).await;
    assert_eq!(first["data"], id.as_str());
}

#[tokio::test]
async fn e2e_unknown_session_id_gets_fresh_id() {
    let (_server, addr, _handle) = boot_server().await;
    let (_ws, id) = connect(addr, Some("never-issued")).await;
    assert_ne!(id, "never-issued");
}

#[tokio::test]
async fn e2e_submit_pushes_shortened_url() {
    let (server, addr, _handle) = boot_server().await;
    let (mut ws, id) = connect(addr, None).await;

    let resp = submit(addr, &json!({"url": "https://example.com/a", "sessionId": id})).await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "URL shortened successfully");

    let push = read_json(&mut ws).await;
    assert_eq!(push["type"], "shortenedUrl");
    assert_eq!(push["sessionId"], id.as_str());
    let code = server.shortcodes().resolve("https://example.com/a").unwrap();
    assert_eq!(push["data"], format!("http://localhost:{}/{code}", addr.port()));
}

#[tokio::test]
async fn e2e_same_url_same_code() {
    let (_server, addr, _handle) = boot_server().await;
    let (mut ws, id) = connect(addr, None).await;

    let body = json!({"url": "https://example.com/same", "sessionId": id});
    assert_eq!(submit(addr, &body).await.status(), 201);
    let first = read_json(&mut ws).await;
    assert_eq!(submit(addr, &body).await.status(), 201);
    let second = read_json(&mut ws).await;

    assert_eq!(first["data"], second["data"]);
}

#[tokio::test]
async fn e2e_offline_submission_replayed_on_connect() {
    let (_server, addr, _handle) = boot_server().await;

    let resp = submit(
        addr,
        &json!({"url": "https://example.com/later", "sessionId": "offline-1"}),
    )
    .await;
    assert_eq!(resp.status(), 201);

    let (mut ws, id) = connect(addr, Some("offline-1")).await;
    assert_eq!(id, "offline-1");
    let push = read_json(&mut ws).await;
    assert_eq!(push["type"], "shortenedUrl");
    assert_eq!(push["sessionId"], "offline-1");
}

#[tokio::test]
async fn e2e_unacknowledged_push_replayed_on_reconnect() {
    let (_server, addr, _handle) = boot_server().await;
    let (mut ws, id) = connect(addr, None).await;

    let _ = submit(addr, &json!({"url": "https://example.com/r", "sessionId": id})).await;
    let push = read_json(&mut ws).await;
    ws.close(None).await.unwrap();

    let (mut ws, resumed) = connect(addr, Some(&id)).await;
    assert_eq!(resumed, id);
    let replayed = read_json(&mut ws).await;
    assert_eq!(replayed, push);
}

#[tokio::test]
async fn e2e_replay_precedes_new_push_on_reconnect() {
    let (_server, addr, _handle) = boot_server().await;
    let (mut ws, id) = connect(addr, None).await;

    let _ = submit(addr, &json!({"url": "https://example.com/old", "sessionId": id})).await;
    let old = read_json(&mut ws).await;
    ws.close(None).await.unwrap();

    let (mut ws, _) = connect(addr, Some(&id)).await;
    let replayed = read_json(&mut ws).await;
    assert_eq!(replayed, old);

    let resp = submit(addr, &json!({"url": "https://example.com/new", "sessionId": id})).await;
    assert_eq!(resp.status(), 201);
    let fresh = read_json(&mut ws).await;
    assert_eq!(fresh["type"], "shortenedUrl");
    assert_ne!(fresh["data"], old["data"]);
    expect_silence(&mut ws).await;
}

#[tokio::test]
async fn e2e_acknowledged_push_not_replayed() {
    let (server, addr, _handle) = boot_server().await;
    let (mut ws, id) = connect(addr, None).await;

    let _ = submit(addr, &json!({"url": "https://example.com/ack", "sessionId": id})).await;
    let _ = read_json(&mut ws).await;
    ws.send(Message::text(json!({"type": "acknowledge"}).to_string()))
        .await
        .unwrap();

    let session = SessionId::from(id.as_str());
    wait_until(|| server.sessions().delivery_confirmed(&session)).await;
    assert!(server.sessions().pending_notification(&session).is_none());
    ws.close(None).await.unwrap();

    let (mut ws, _) = connect(addr, Some(&id)).await;
    expect_silence(&mut ws).await;
}

#[tokio::test]
async fn e2e_malformed_client_message_ignored() {
    let (_server, addr, _handle) = boot_server().await;
    let (mut ws, id) = connect(addr, None).await;

    ws.send(Message::text("{not json")).await.unwrap();
    ws.send(Message::text(json!({"type": "mystery"}).to_string()))
        .await
        .unwrap();

    let _ = submit(addr, &json!({"url": "https://example.com/m", "sessionId": id})).await;
    let push = read_json(&mut ws).await;
    assert_eq!(push["type"], "shortenedUrl");
}

#[tokio::test]
async fn e2e_invalid_url_rejected() {
    let (server, addr, _handle) = boot_server().await;
    let resp = submit(addr, &json!({"url": "definitely not a url", "sessionId": "s"})).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid URL");
    assert!(server.shortcodes().is_empty());
}

#[tokio::test]
async fn e2e_redirect_and_not_found() {
    let (server, addr, _handle) = boot_server().await;
    let code = server.shortcodes().assign("https://example.com/target");
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let resp = client
        .get(format!("http://{addr}/{code}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 302);
    assert_eq!(
        resp.headers().get("location").unwrap(),
        "https://example.com/target"
    );

    let resp = client
        .get(format!("http://{addr}/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Shortened URL not found");
}

#[tokio::test]
async fn e2e_disconnect_unbinds_session() {
    let (server, addr, _handle) = boot_server().await;
    let (mut ws, id) = connect(addr, None).await;
    wait_until(|| server.sessions().connected_count() == 1).await;

    ws.close(None).await.unwrap();
    wait_until(|| server.sessions().connected_count() == 0).await;
    assert!(server.sessions().contains(&SessionId::from(id.as_str())));
}

#[tokio::test]
async fn e2e_graceful_shutdown_closes_clients() {
    let (server, addr, handle) = boot_server().await;
    let (mut ws, _) = connect(addr, None).await;
    wait_until(|| server.sessions().connected_count() == 1).await;
    // Serve loop, sweeper and the WebSocket session.
    assert_eq!(server.shutdown().active_tasks(), 3);

    assert!(server.shutdown().drain(Some(TIMEOUT)).await);
    assert_eq!(server.sessions().connected_count(), 0);
    handle.await.unwrap();

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "client never saw close");
}
