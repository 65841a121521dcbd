//! Chat module
//!
//! Real-time group chat: history fetch, live connection lifecycle and the
//! deduplicated message list.

pub mod api_client;
mod connection;
pub mod history;
pub mod manager;
pub mod models;
pub mod session;
pub mod state;

pub use history::MessageHistory;
pub use manager::ChatManager;
pub use models::{Author, ChannelId, Message, MessageId, OutgoingMessage};
pub use session::ChatSession;
pub use state::{ConnectionEvent, ConnectionState};
