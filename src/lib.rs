//! LearnConnect Chat Client Library
//!
//! Client side of the study-group chat: history fetch, a persistent
//! WebSocket with fixed-delay reconnection, and a deduplicated message list.
//! The terminal host binary is in `src/main.rs`.

pub mod chat;
pub mod config;
pub mod error;
