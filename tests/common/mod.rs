//! In-process chat backend used by the integration tests
//!
//! Serves the history endpoint and the group WebSocket the way the real
//! backend does: bearer auth on REST, `?token=` on the socket, close code
//! 1008 for bad credentials, and every received `{content}` broadcast back as
//! a stored message.

#![allow(dead_code)]

use axum::{
    extract::{
        ws::{CloseFrame, Message as WsFrame, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use learnconnect_chat::chat::{ChatSession, ConnectionState, MessageId};
use learnconnect_chat::config::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Token the fixture accepts
pub const VALID_TOKEN: &str = "valid-token";

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Shared fixture state, inspected by the tests
pub struct ServerState {
    history: Mutex<Vec<Value>>,
    history_status: Mutex<StatusCode>,
    history_delay: Mutex<Duration>,
    next_id: AtomicI64,
    /// Sockets upgraded so far, accepted or not
    pub connections: AtomicUsize,
    /// Authenticated sockets currently open and subscribed to the feed
    pub active: AtomicUsize,
    /// History requests served
    pub history_requests: AtomicUsize,
    received: Mutex<Vec<String>>,
    channels_seen: Mutex<Vec<String>>,
    feed: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
}

/// Running fixture
pub struct ChatServer {
    /// Bound address
    pub addr: SocketAddr,
    /// Fixture state
    pub state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A stored message as the backend serialises it
pub fn server_message(id: MessageId, group: &str, content: &str) -> Value {
    json!({
        "id": id,
        "group_id": group.parse::<i64>().unwrap_or(0),
        "user_id": 1,
        "content": content,
        "created_at": "2024-03-01T10:00:00",
        "user": {
            "id": 1,
            "name": "Tester",
            "email": "tester@example.com",
            "profile_picture": null,
            "bio": null,
            "created_at": "2024-01-01T00:00:00"
        }
    })
}

impl ChatServer {
    /// Start the fixture with a stored history for every group
    pub async fn spawn(history: Vec<Value>) -> Self {
        let (feed, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let state = Arc::new(ServerState {
            history: Mutex::new(history),
            history_status: Mutex::new(StatusCode::OK),
            history_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicI64::new(1000),
            connections: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            history_requests: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            channels_seen: Mutex::new(Vec::new()),
            feed,
            kick,
        });

        let app = Router::new()
            .route("/api/groups/:group/messages", get(history_handler))
            .route("/api/groups/:group/ws", get(live_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    /// Client configuration pointing at this fixture
    pub fn config(&self, reconnect_delay_ms: u64) -> Config {
        let mut config = Config::default();
        config.api.base_url = format!("http://{}", self.addr);
        config.reconnect.delay_ms = reconnect_delay_ms;
        config
    }

    /// Make the history endpoint answer with `status`
    pub fn fail_history(&self, status: StatusCode) {
        *self.state.history_status.lock().unwrap() = status;
    }

    /// Delay history responses
    pub fn delay_history(&self, delay: Duration) {
        *self.state.history_delay.lock().unwrap() = delay;
    }

    /// Push a server-originated message to every open socket
    pub fn push(&self, id: MessageId, content: &str) {
        let _ = self
            .state
            .feed
            .send(server_message(id, "42", content).to_string());
    }

    /// Close every open socket from the server side
    pub fn kick_all(&self) {
        let _ = self.state.kick.send(());
    }

    /// Contents received from clients, in order
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }

    /// Groups of every socket opened, in order
    pub fn channels_seen(&self) -> Vec<String> {
        self.state.channels_seen.lock().unwrap().clone()
    }

    /// Total sockets upgraded so far
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Authenticated sockets currently open
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Wait until exactly `n` authenticated sockets are open
    pub async fn wait_for_active(&self, n: usize) {
        wait_until(|| self.active() == n).await;
    }
}

async fn history_handler(
    Path(_group): Path<String>,
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    state.history_requests.fetch_add(1, Ordering::SeqCst);

    let delay = *state.history_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {}", VALID_TOKEN));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Could not validate credentials").into_response();
    }

    let status = *state.history_status.lock().unwrap();
    if status != StatusCode::OK {
        return (status, "history unavailable").into_response();
    }

    let history = state.history.lock().unwrap().clone();
    Json(history).into_response()
}

async fn live_handler(
    ws: WebSocketUpgrade,
    Path(group): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let token = params.get("token").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, group, token, state))
}

async fn handle_socket(mut socket: WebSocket, group: String, token: String, state: Arc<ServerState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.channels_seen.lock().unwrap().push(group.clone());

    if token != VALID_TOKEN {
        let _ = socket
            .send(WsFrame::Close(Some(CloseFrame {
                code: 1008,
                reason: "Invalid token".into(),
            })))
            .await;
        return;
    }

    let mut feed = state.feed.subscribe();
    let mut kick = state.kick.subscribe();
    state.active.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            frame = socket.recv() => match frame {
                Some(Ok(WsFrame::Text(text))) => {
                    let content = serde_json::from_str::<Value>(&text)
                        .ok()
                        .and_then(|v| v["content"].as_str().map(str::to_string))
                        .unwrap_or_default();
                    state.received.lock().unwrap().push(content.clone());
                    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
                    let _ = state.feed.send(server_message(id, &group, &content).to_string());
                }
                Some(Ok(WsFrame::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            pushed = feed.recv() => match pushed {
                Ok(text) => {
                    if socket.send(WsFrame::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = kick.recv() => {
                let _ = socket
                    .send(WsFrame::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Server restarting".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    state.active.fetch_sub(1, Ordering::SeqCst);
}

/// Poll `condition` until it holds, panicking after a few seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the session reports `target`
pub async fn wait_for_state(session: &ChatSession, target: ConnectionState) {
    let mut rx = session.subscribe_state();
    tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|state| *state == target))
        .await
        .unwrap_or_else(|_| panic!("session never reached {}", target))
        .expect("state channel closed");
}

/// Message ids currently displayed by the session
pub fn ids(session: &ChatSession) -> Vec<MessageId> {
    session.messages().iter().map(|m| m.id).collect()
}
