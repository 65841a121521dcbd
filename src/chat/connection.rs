//! Live connection task
//!
//! Owns one WebSocket for its whole life and reports what happens on it as
//! [`ConnectionEvent`]s tagged with the connection generation. Outbound
//! frames arrive through an mpsc queue; dropping the queue's sender closes
//! the socket.

use super::models::{Message, OutgoingMessage};
use super::state::ConnectionEvent;
use crate::error::ChatError;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn, Instrument, Span};

/// Sender side of the session's event loop
pub(crate) type EventSender = mpsc::UnboundedSender<(u64, ConnectionEvent)>;

/// Session-side handle to a running connection task
pub(crate) struct ConnectionHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<OutgoingMessage>,
    _task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Spawn the connection task for `url`
    pub(crate) fn spawn(url: Url, generation: u64, events: EventSender, span: Span) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url, generation, outbound_rx, events).instrument(span));
        Self {
            generation,
            outbound,
            _task: task,
        }
    }

    /// Generation this connection was opened for
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a frame for the socket
    ///
    /// Returns `false` if the task has already exited.
    pub(crate) fn send(&self, message: OutgoingMessage) -> bool {
        self.outbound.send(message).is_ok()
    }

    /// Handle with no socket behind it, exposing the outbound queue
    #[cfg(test)]
    pub(crate) fn detached(generation: u64) -> (Self, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let handle = Self {
            generation,
            outbound,
            _task: tokio::spawn(async {}),
        };
        (handle, outbound_rx)
    }

    /// Ask the task to send a close frame and exit
    pub(crate) fn close(self) {
        debug!(generation = self.generation, "Closing connection");
        // Dropping the only sender ends the task's outbound stream.
    }
}

/// Decode one inbound frame
///
/// Returns `Ok(None)` for frames that carry no message (ping, pong, close).
pub(crate) fn decode_frame(frame: &WsMessage) -> Result<Option<Message>, ChatError> {
    match frame {
        WsMessage::Text(text) => Ok(Some(serde_json::from_str(text)?)),
        WsMessage::Binary(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        _ => Ok(None),
    }
}

async fn run(
    url: Url,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<OutgoingMessage>,
    events: EventSender,
) {
    // The session may already be gone; nothing to report to then.
    let emit = |event: ConnectionEvent| {
        let _ = events.send((generation, event));
    };

    let socket = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            let err = ChatError::from(e);
            emit(ConnectionEvent::TransportError(err.to_string()));
            emit(ConnectionEvent::Closed {
                code: None,
                reason: "connection failed".to_string(),
            });
            return;
        }
    };

    emit(ConnectionEvent::Opened);

    let (mut sink, mut stream) = socket.split();
    let mut close_frame: Option<CloseFrame<'static>> = None;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Close(frame))) => {
                    // Keep reading so the close handshake can complete.
                    close_frame = frame;
                }
                Some(Ok(frame)) => match decode_frame(&frame) {
                    Ok(Some(message)) => emit(ConnectionEvent::MessageReceived(message)),
                    Ok(None) => {}
                    Err(e) => warn!(generation, error = %e, "Skipping undecodable frame"),
                },
                Some(Err(e)) => {
                    if close_frame.is_none() {
                        emit(ConnectionEvent::TransportError(ChatError::from(e).to_string()));
                    }
                    break;
                }
                None => break,
            },
            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(generation, error = %e, "Failed to encode outgoing message");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(WsMessage::Text(json)).await {
                        emit(ConnectionEvent::TransportError(ChatError::from(e).to_string()));
                        break;
                    }
                }
                None => {
                    if let Err(e) = sink.send(WsMessage::Close(None)).await {
                        debug!(generation, error = %e, "Close frame not delivered");
                    }
                    emit(ConnectionEvent::Closed {
                        code: None,
                        reason: "closed by client".to_string(),
                    });
                    return;
                }
            },
        }
    }

    let (code, reason) = match close_frame {
        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
        None => (None, String::new()),
    };
    emit(ConnectionEvent::Closed { code, reason });
}
