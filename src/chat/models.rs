//! Chat data models
//!
//! Wire types for group chat messages and the channel they belong to.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Server-assigned message identifier
pub type MessageId = i64;

/// Opaque identifier of a chat channel (a study group)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Author of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// User identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Avatar reference, if the user has one
    #[serde(default)]
    pub profile_picture: Option<String>,
}

/// A single message in a group chat
///
/// Messages are created server-side and never mutated once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, assigned by the server
    pub id: MessageId,
    /// Group the message was posted to
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Author's user id
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Text content
    pub content: String,
    /// When the message was created
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Author details
    pub user: Author,
}

/// Outbound frame sent over the live connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Message body
    pub content: String,
}

// The backend stores naive UTC datetimes, so timestamps may arrive with or
// without an offset.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
