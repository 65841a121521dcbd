//! Chat Session
//!
//! Manages the live connection for a single channel: one history fetch per
//! activation, a WebSocket that is reopened after every close, and the
//! deduplicated message list the presentation layer renders.
//!
//! Nothing here returns errors to the caller. Failures show up as
//! [`ConnectionState`] changes and log lines.

use super::api_client;
use super::connection::{ConnectionHandle, EventSender};
use super::history::MessageHistory;
use super::models::{ChannelId, Message, OutgoingMessage};
use super::state::{transition, Action, ConnectionEvent, ConnectionState, Transition};
use crate::config::Config;
use crate::error::ChatError;
use reqwest::Url;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Endpoints resolved on activation
struct Endpoints {
    history: Url,
    live: Url,
    token: String,
}

impl Endpoints {
    fn resolve(config: &Config, channel: &ChannelId, token: &str) -> Result<Self, ChatError> {
        if token.trim().is_empty() {
            return Err(ChatError::MissingToken);
        }
        Ok(Self {
            history: api_client::history_url(&config.api.base_url, channel)?,
            live: api_client::ws_url(&config.ws_base_url(), channel, token)?,
            token: token.to_string(),
        })
    }
}

/// Mutable session data, guarded by one lock so each transition is atomic
#[derive(Default)]
struct Runtime {
    endpoints: Option<Endpoints>,
    torn_down: bool,
    /// Bumped by every connect; events and timers from older generations are dropped
    generation: u64,
    events: Option<EventSender>,
    event_loop: Option<JoinHandle<()>>,
    connection: Option<ConnectionHandle>,
    reconnect: Option<JoinHandle<()>>,
    fetch: Option<JoinHandle<()>>,
}

struct SessionInner {
    channel: ChannelId,
    config: Arc<Config>,
    http: reqwest::Client,
    span: Span,
    state_tx: watch::Sender<ConnectionState>,
    /// Owns the history; mutated in place so receivers never see a copy
    messages_tx: watch::Sender<MessageHistory>,
    runtime: Mutex<Runtime>,
}

/// Client-side owner of one channel's live connection
///
/// The channel is fixed for the lifetime of the session; switching channels
/// means tearing this one down and creating another (see
/// [`ChatManager`](super::ChatManager)). Must be used from within a Tokio
/// runtime. Dropping the session tears it down.
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Create an inactive session for `channel`
    ///
    /// The session starts out `Disconnected` and does nothing until
    /// [`activate`](Self::activate) is called.
    pub fn new(channel: ChannelId, config: Arc<Config>, http: reqwest::Client) -> Self {
        let span = info_span!(
            "chat_session",
            session_id = %Uuid::new_v4(),
            channel = %channel,
        );
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (messages_tx, _) = watch::channel(MessageHistory::new());

        Self {
            inner: Arc::new(SessionInner {
                channel,
                config,
                http,
                span,
                state_tx,
                messages_tx,
                runtime: Mutex::new(Runtime::default()),
            }),
        }
    }

    /// Start the session with the given credential
    ///
    /// Kicks off the history fetch and the live connection concurrently.
    /// Calling it again once active is a no-op. An empty token moves the
    /// session to `Error` without attempting a connection.
    pub fn activate(&self, token: &str) {
        let inner = &self.inner;
        let _entered = inner.span.enter();
        let mut rt = inner.lock_runtime();

        if rt.torn_down {
            debug!("Ignoring activation of a torn down session");
            return;
        }
        if rt.endpoints.is_some() {
            debug!("Session already active");
            return;
        }

        let endpoints = match Endpoints::resolve(&inner.config, &inner.channel, token) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(error = %e, "Activation refused");
                inner.set_state(ConnectionState::Error);
                return;
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        rt.events = Some(events_tx);
        rt.event_loop = Some(tokio::spawn(
            Arc::clone(inner)
                .run_event_loop(events_rx)
                .instrument(inner.span.clone()),
        ));
        rt.fetch = Some(tokio::spawn(
            Arc::clone(inner)
                .load_history(endpoints.history.clone(), endpoints.token.clone())
                .instrument(inner.span.clone()),
        ));
        rt.endpoints = Some(endpoints);

        info!("Session activated");
        inner.connect(&mut rt);
    }

    /// Send a message body over the live connection
    ///
    /// Silently does nothing unless the body is non-blank and the session is
    /// `Connected`. The message is not added to the history here; it shows up
    /// once the server echoes it back.
    pub fn send(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let inner = &self.inner;
        let _entered = inner.span.enter();
        let rt = inner.lock_runtime();

        let state = *inner.state_tx.borrow();
        if state != ConnectionState::Connected {
            debug!(state = %state, "Send ignored while not connected");
            return;
        }
        let Some(connection) = rt.connection.as_ref() else {
            return;
        };

        let queued = connection.send(OutgoingMessage {
            content: text.to_string(),
        });
        debug!(
            generation = connection.generation(),
            content_len = text.len(),
            queued,
            "Message handed to connection"
        );
    }

    /// Stop the session for good
    ///
    /// Cancels any pending reconnect, closes the live connection and leaves
    /// the state at `Disconnected`. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    /// Channel this session is bound to
    pub fn channel(&self) -> &ChannelId {
        &self.inner.channel
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Copy of the message list in display order
    pub fn messages(&self) -> Vec<Message> {
        self.inner.messages_tx.borrow().messages().to_vec()
    }

    /// Watch message list changes
    ///
    /// Borrow the history from the receiver instead of calling
    /// [`messages`](Self::messages) on every change to avoid copying it.
    pub fn subscribe_messages(&self) -> watch::Receiver<MessageHistory> {
        self.inner.messages_tx.subscribe()
    }

    /// Whether [`teardown`](Self::teardown) has run
    pub fn is_torn_down(&self) -> bool {
        self.inner.lock_runtime().torn_down
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl SessionInner {
    fn lock_runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "Connection state changed");
            *state = next;
            true
        });
    }

    /// Open a new connection, closing the previous one first
    fn connect(self: &Arc<Self>, rt: &mut Runtime) {
        if rt.torn_down {
            return;
        }
        let (Some(endpoints), Some(events)) = (rt.endpoints.as_ref(), rt.events.as_ref()) else {
            return;
        };
        let live = endpoints.live.clone();
        let events = events.clone();

        if let Some(pending) = rt.reconnect.take() {
            pending.abort();
        }
        if let Some(previous) = rt.connection.take() {
            previous.close();
        }

        rt.generation += 1;
        let generation = rt.generation;
        self.set_state(ConnectionState::Connecting);

        info!(generation, url = %api_client::redact(&live), "Connecting");
        rt.connection = Some(ConnectionHandle::spawn(
            live,
            generation,
            events,
            self.span.clone(),
        ));
    }

    async fn run_event_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<(u64, ConnectionEvent)>,
    ) {
        while let Some((generation, event)) = events.recv().await {
            self.handle_event(generation, event);
        }
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: ConnectionEvent) {
        let mut rt = self.lock_runtime();
        if rt.torn_down || generation != rt.generation {
            debug!(
                generation,
                current = rt.generation,
                "Ignoring event from a superseded connection"
            );
            return;
        }

        match &event {
            ConnectionEvent::Opened => info!(generation, "Connection opened"),
            ConnectionEvent::MessageReceived(message) => {
                debug!(generation, message_id = message.id, "Message received")
            }
            ConnectionEvent::TransportError(error) => {
                warn!(generation, error = %error, "Transport error")
            }
            ConnectionEvent::Closed { code, reason } => {
                info!(generation, code = ?code, reason = %reason, "Connection closed")
            }
        }

        let current = *self.state_tx.borrow();
        let Transition { next, action } = transition(current, event);
        match action {
            Action::CancelReconnect => {
                if let Some(pending) = rt.reconnect.take() {
                    pending.abort();
                }
            }
            Action::Append(message) => {
                let message_id = message.id;
                let appended = self
                    .messages_tx
                    .send_if_modified(|history| history.merge(message));
                if !appended {
                    debug!(message_id, "Discarding duplicate message");
                }
            }
            Action::ScheduleReconnect => {
                rt.connection = None;
                self.schedule_reconnect(&mut rt);
            }
            Action::None => {}
        }
        self.set_state(next);
    }

    /// Schedule one reconnect, replacing any pending timer
    fn schedule_reconnect(self: &Arc<Self>, rt: &mut Runtime) {
        if let Some(pending) = rt.reconnect.take() {
            pending.abort();
        }

        let delay = self.config.reconnect_delay();
        let scheduled_for = rt.generation;
        let inner = Arc::clone(self);

        info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        rt.reconnect = Some(tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                inner.reconnect(scheduled_for);
            }
            .instrument(self.span.clone()),
        ));
    }

    fn reconnect(self: &Arc<Self>, scheduled_for: u64) {
        let mut rt = self.lock_runtime();
        if rt.torn_down || rt.generation != scheduled_for {
            debug!(scheduled_for, "Reconnect timer superseded");
            return;
        }
        // This task is the pending timer; let it finish instead of aborting it.
        rt.reconnect = None;
        self.connect(&mut rt);
    }

    async fn load_history(self: Arc<Self>, url: Url, token: String) {
        match api_client::fetch_history(&self.http, &url, &token).await {
            Ok(batch) => {
                let rt = self.lock_runtime();
                if rt.torn_down {
                    return;
                }
                let count = batch.len();
                self.messages_tx
                    .send_modify(|history| history.apply_fetched(batch));
                let total = self.messages_tx.borrow().len();
                info!(count, total, "Message history loaded");
            }
            Err(e) => warn!(error = %e, "Failed to load message history"),
        }
    }

    fn teardown(&self) {
        let _entered = self.span.enter();
        let mut rt = self.lock_runtime();
        if rt.torn_down {
            return;
        }
        rt.torn_down = true;

        // Timer first, so a close racing with it cannot reconnect.
        if let Some(pending) = rt.reconnect.take() {
            pending.abort();
        }
        if let Some(fetch) = rt.fetch.take() {
            fetch.abort();
        }
        if let Some(connection) = rt.connection.take() {
            connection.close();
        }
        rt.events = None;
        if let Some(event_loop) = rt.event_loop.take() {
            event_loop.abort();
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Session torn down");
    }
}
