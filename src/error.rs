//! Error types for the chat client
//!
//! None of these reach the presentation layer directly: the session turns
//! them into state transitions and log lines.

use thiserror::Error;

/// Errors raised by the fallible steps of a chat session
#[derive(Error, Debug)]
pub enum ChatError {
    /// No credential was supplied on activation
    #[error("Missing authentication token")]
    MissingToken,

    /// An endpoint URL could not be built from the configuration
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP request could not be sent or its body could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Server returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// A payload was not valid message JSON
    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// WebSocket transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The shared HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}
