//! Transport abstraction
//!
//! A transport owns the network socket. It accepts non-blocking requests
//! (connect, disconnect, write) and reports everything that happens on the
//! socket as a [`TransportEvent`] over an ordered channel. The receiving end
//! of that channel is consumed by exactly one task per connection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::errors::TransportError;

#[cfg(feature = "websocket")]
pub mod websocket;

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Events reported by a transport, in the order they happened
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake completed; carries the response headers
    Connected { headers: HashMap<String, String> },
    /// Peer closed the connection cleanly
    Disconnected { reason: String, code: u16 },
    /// Text frame received
    Text(String),
    /// Binary frame received
    Binary(Vec<u8>),
    /// Ping control frame received
    Ping(Option<Vec<u8>>),
    /// Pong control frame received
    Pong(Option<Vec<u8>>),
    /// Connection failed or broke
    Error(TransportError),
    /// Network path viability changed
    ViabilityChanged(bool),
    /// Transport suggests reconnecting (e.g. a better path appeared)
    ReconnectSuggested(bool),
    /// Connection attempt or session was cancelled locally
    Cancelled,
}

impl TransportEvent {
    /// Short variant name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Connected { .. } => "connected",
            TransportEvent::Disconnected { .. } => "disconnected",
            TransportEvent::Text(_) => "text",
            TransportEvent::Binary(_) => "binary",
            TransportEvent::Ping(_) => "ping",
            TransportEvent::Pong(_) => "pong",
            TransportEvent::Error(_) => "error",
            TransportEvent::ViabilityChanged(_) => "viability_changed",
            TransportEvent::ReconnectSuggested(_) => "reconnect_suggested",
            TransportEvent::Cancelled => "cancelled",
        }
    }

    /// Whether this event ends an open cycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportEvent::Disconnected { .. } | TransportEvent::Error(_) | TransportEvent::Cancelled
        )
    }
}

// ----------------------------------------------------------------------------
// Event Channel
// ----------------------------------------------------------------------------

/// Receiving half of a transport event channel
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending half of a transport event channel, held by the transport
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSender {
    /// Report an event; dropped silently once the connection is gone
    pub fn emit(&self, event: TransportEvent) {
        let kind = event.kind();
        if self.inner.send(event).is_err() {
            trace!(kind, "event receiver dropped, discarding transport event");
        }
    }

    /// Whether the receiving side still exists
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Create the ordered channel a transport reports its events on
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (inner, receiver) = mpsc::unbounded_channel();
    (EventSender { inner }, receiver)
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Socket collaborator driven by a [`crate::Connection`]
///
/// Every method is a request that returns immediately; outcomes arrive later
/// as [`TransportEvent`]s. Writes may be issued from any thread, including
/// while the event task is busy delivering a callback.
pub trait Transport: Send + Sync + 'static {
    /// Begin establishing the connection
    fn connect(&self);

    /// Begin tearing down the connection
    fn disconnect(&self);

    /// Queue a text frame
    fn write_text(&self, text: String);

    /// Queue a ping control frame
    fn write_ping(&self, payload: Vec<u8>);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn connect(&self) {
        (**self).connect()
    }

    fn disconnect(&self) {
        (**self).disconnect()
    }

    fn write_text(&self, text: String) {
        (**self).write_text(text)
    }

    fn write_ping(&self, payload: Vec<u8>) {
        (**self).write_ping(payload)
    }
}
