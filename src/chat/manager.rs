//! Chat Manager
//!
//! Keeps the presentation layer's single active chat session. A session is
//! bound to one channel, so switching channels tears the old session down
//! (cancelling its reconnect timer and closing its socket) before the new one
//! is created.

use super::models::ChannelId;
use super::session::ChatSession;
use crate::config::Config;
use crate::error::ChatError;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns at most one active [`ChatSession`]
pub struct ChatManager {
    /// Shared configuration handed to every session
    config: Arc<Config>,
    /// Shared HTTP client (connection pooling, request timeout)
    http: reqwest::Client,
    /// Session for the channel currently on screen
    current: Option<ChatSession>,
}

impl ChatManager {
    /// Create a manager, building the shared HTTP client from `config`
    ///
    /// # Errors
    /// * `ChatError::ClientBuild` if the HTTP client cannot be constructed
    pub fn new(config: Config) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ChatError::ClientBuild(e.to_string()))?;
        Ok(Self::with_client(config, http))
    }

    /// Create a manager around an existing HTTP client
    pub fn with_client(config: Config, http: reqwest::Client) -> Self {
        Self {
            config: Arc::new(config),
            http,
            current: None,
        }
    }

    /// Activate the chat for `channel`
    ///
    /// Reuses the current session when it is already bound to `channel`
    /// (activation itself is idempotent). Otherwise the current session is
    /// torn down first and a fresh one is created and activated.
    pub fn activate(&mut self, channel: ChannelId, token: &str) -> &ChatSession {
        let reusable = self
            .current
            .as_ref()
            .is_some_and(|session| session.channel() == &channel && !session.is_torn_down());

        if reusable {
            debug!(channel = %channel, "Reusing existing chat session");
        } else if let Some(previous) = self.current.take() {
            info!(
                from = %previous.channel(),
                to = %channel,
                "Switching chat channel"
            );
            previous.teardown();
        }

        let config = Arc::clone(&self.config);
        let http = self.http.clone();
        let session = self
            .current
            .get_or_insert_with(|| ChatSession::new(channel, config, http));
        session.activate(token);
        session
    }

    /// Session for the active channel, if any
    pub fn current(&self) -> Option<&ChatSession> {
        self.current.as_ref()
    }

    /// Tear down and forget the active session
    pub fn teardown(&mut self) {
        if let Some(session) = self.current.take() {
            info!(channel = %session.channel(), "Closing chat session");
            session.teardown();
        }
    }
}

impl Drop for ChatManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
