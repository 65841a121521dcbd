//! Chat REST client and endpoint construction
//!
//! History is loaded with one authenticated GET. The WebSocket target is built
//! here too, since the token has to travel in its query string.

use super::models::{ChannelId, Message};
use crate::error::ChatError;
use reqwest::Url;

/// Build the history endpoint: `{base}/api/groups/{channel}/messages`
pub fn history_url(base_url: &str, channel: &ChannelId) -> Result<Url, ChatError> {
    group_endpoint(base_url, channel, "messages")
}

/// Build the live feed target: `{ws_base}/api/groups/{channel}/ws?token={token}`
///
/// The transport cannot carry custom headers, so the token is embedded in
/// the query string (percent-encoded).
pub fn ws_url(ws_base_url: &str, channel: &ChannelId, token: &str) -> Result<Url, ChatError> {
    if token.trim().is_empty() {
        return Err(ChatError::MissingToken);
    }
    let mut url = group_endpoint(ws_base_url, channel, "ws")?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChatError::InvalidUrl(format!(
            "unsupported WebSocket scheme: {}",
            url.scheme()
        )));
    }
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

fn group_endpoint(base_url: &str, channel: &ChannelId, leaf: &str) -> Result<Url, ChatError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ChatError::InvalidUrl(format!("{}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| ChatError::InvalidUrl(format!("{} cannot be a base URL", base_url)))?
        .pop_if_empty()
        .extend(["api", "groups", channel.as_str(), leaf]);
    Ok(url)
}

/// Render a URL for logs with its query string removed
pub fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

/// Fetch a channel's stored messages, oldest first
///
/// # Arguments
/// * `client` - Shared HTTP client (connection pooling, timeout)
/// * `url` - History endpoint from [`history_url`]
/// * `token` - Bearer token
///
/// # Errors
/// * `ChatError::Http` if the request fails or the body cannot be read
/// * `ChatError::Status` for any non-2xx response
/// * `ChatError::Decode` if the body is not a JSON array of messages
pub async fn fetch_history(
    client: &reqwest::Client,
    url: &Url,
    token: &str,
) -> Result<Vec<Message>, ChatError> {
    tracing::debug!(url = %redact(url), "Fetching message history");

    let response = client.get(url.clone()).bearer_auth(token).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        return Err(ChatError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    let messages: Vec<Message> = serde_json::from_str(&body)?;

    tracing::debug!(count = messages.len(), "Message history received");
    Ok(messages)
}
