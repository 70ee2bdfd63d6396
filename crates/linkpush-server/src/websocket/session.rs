//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use futures::{SinkExt, StreamExt};
use linkpush_core::{ClientMessage, Notification, NotificationChannel, SessionId};
use metrics::{counter, gauge};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::connection::ClientConnection;
use crate::delivery::DeliveryEngine;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::server::AppState;

/// Cookie (and query parameter) carrying the session id.
pub const SESSION_COOKIE: &str = "sessionId";

/// Query parameters accepted on `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Previously issued session id.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// GET /ws: resolve the session, then upgrade.
///
/// The presented id comes from the `sessionId` query parameter or, failing
/// that, the `sessionId` cookie. The upgrade response sets the cookie to the
/// resolved id.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    jar: CookieJar,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let presented = params
        .session_id
        .filter(|s| !s.is_empty())
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()));
    let (session_id, resumed) = state.sessions.get_or_create(presented.as_deref());
    let jar = jar.add(session_cookie(&session_id));
    let shutdown = Arc::clone(&state.shutdown);
    let upgrade = ws.on_upgrade(move |socket| {
        shutdown.track(run_ws_session(socket, session_id, resumed, state))
    });
    (jar, upgrade)
}

/// Browser cookie persisting the session id. Readable from page scripts so
/// the submission form can echo it back in the request body.
pub fn session_cookie(session_id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .same_site(SameSite::Lax)
        .build()
}

/// Run a WebSocket session for a connected client.
///
/// 1. Queues the `sessionId` notification as the first outbound frame
/// 2. Binds the connection to the session in the registry
/// 3. Replays any unacknowledged notification
/// 4. Forwards outbound frames and sends periodic Ping frames
/// 5. Dispatches inbound `acknowledge` messages
/// 6. Unbinds the connection on disconnect
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    session_id: SessionId,
    resumed: bool,
    state: AppState,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let capacity = state.config.send_queue_capacity.max(1);
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(capacity);
    let connection = Arc::new(ClientConnection::new(send_tx));
    let connection_id = connection.id.clone();

    info!(%connection_id, resumed, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Queued before binding, so it precedes any replay or new push.
    match Notification::session_assigned(session_id.clone()).encode() {
        Ok(frame) => {
            if let Err(e) = connection.send(frame) {
                warn!(%connection_id, error = %e, "failed to queue session id");
            }
        }
        Err(e) => error!(%connection_id, error = %e, "failed to encode session id"),
    }

    if let Some(previous) = state.sessions.bind_channel(&session_id, connection.clone()) {
        debug!(
            %connection_id,
            previous = %previous.connection_id(),
            "replaced stale connection"
        );
    }

    let engine = Arc::clone(&state.delivery);
    let replay_session = session_id.clone();
    drop(tokio::spawn(async move {
        let _ = engine.replay(&replay_session).await;
    }));

    // Outbound forwarder with periodic Ping frames.
    let ping_every = Duration::from_secs(state.config.heartbeat_interval_secs.max(1));
    let pong_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let outbound_conn = Arc::clone(&connection);
    let shutdown = state.shutdown.token();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Process incoming messages until the client or the writer goes away.
    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                match msg {
                    Message::Text(text) => {
                        connection.mark_alive();
                        handle_client_text(text.as_str(), &session_id, &state.delivery);
                    }
                    Message::Binary(data) => {
                        connection.mark_alive();
                        match std::str::from_utf8(&data) {
                            Ok(text) => handle_client_text(text, &session_id, &state.delivery),
                            Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                        }
                    }
                    Message::Ping(_) | Message::Pong(_) => connection.mark_alive(),
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                }
            }
            _ = &mut outbound => break,
        }
    }

    // Clean up
    outbound.abort();
    let unbound = state.sessions.unbind_channel(&session_id, &connection_id);
    info!(
        %connection_id,
        unbound,
        connected_secs = connection.age().as_secs(),
        dropped_frames = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Dispatch one inbound text frame. Malformed and unknown messages are
/// logged and ignored.
pub fn handle_client_text(text: &str, session_id: &SessionId, engine: &DeliveryEngine) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Acknowledge) => {
            let _ = engine.acknowledge(session_id);
        }
        Ok(ClientMessage::Unknown) => debug!(%session_id, "ignoring unknown client message"),
        Err(e) => warn!(%session_id, error = %e, "ignoring malformed client message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::RetryPolicy;
    use linkpush_store::SessionRegistry;

    fn engine_with_sent_notification(id: &SessionId) -> DeliveryEngine {
        let registry = Arc::new(SessionRegistry::new());
        let engine = DeliveryEngine::new(Arc::clone(&registry), RetryPolicy::default());
        let frame = Notification::shortened_url(id.clone(), "u").encode().unwrap();
        let generation =
            registry.enqueue(id, Notification::shortened_url(id.clone(), "u"), frame);
        let _ = registry.finish_attempt(id, generation, true);
        engine
    }

    #[test]
    fn acknowledge_message_clears_pending() {
        let id = SessionId::from("s1");
        let engine = engine_with_sent_notification(&id);
        handle_client_text(r#"{"type":"acknowledge"}"#, &id, &engine);
        assert!(engine.registry().pending_notification(&id).is_none());
    }

    #[test]
    fn unknown_and_malformed_messages_are_ignored() {
        let id = SessionId::from("s1");
        let engine = engine_with_sent_notification(&id);
        handle_client_text(r#"{"type":"hello"}"#, &id, &engine);
        handle_client_text("not json", &id, &engine);
        handle_client_text("", &id, &engine);
        assert!(engine.registry().pending_notification(&id).is_some());
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(&SessionId::from("abc"));
        assert_eq!(cookie.name(), "sessionId");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
