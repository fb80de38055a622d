//! WebSocket transport over tokio-tungstenite
//!
//! Each `connect()` spawns one socket task that owns the stream for the whole
//! open cycle. Writes and the close request reach it through a command
//! channel, so they can be issued from any thread without blocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{EventSender, Transport, TransportEvent};
use crate::errors::TransportError;

/// Close code reported when the peer sent a close frame without a status
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Close code reported when the stream ended without any close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Requests forwarded to the socket task
#[derive(Debug)]
enum Outbound {
    Text(String),
    Ping(Vec<u8>),
    Close,
}

#[derive(Debug)]
struct ActiveSocket {
    commands: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
    /// Set once the task has reported its terminal event
    ended: Arc<AtomicBool>,
}

impl ActiveSocket {
    /// Whether this socket still owns the current open cycle
    fn is_busy(&self) -> bool {
        !self.task.is_finished() && !self.ended.load(Ordering::Acquire)
    }
}

// ----------------------------------------------------------------------------
// WebSocket Transport
// ----------------------------------------------------------------------------

/// [`Transport`] speaking WebSocket to a single bridge endpoint
#[derive(Debug)]
pub struct WebSocketTransport {
    url: Url,
    events: EventSender,
    runtime: Handle,
    active: Mutex<Option<ActiveSocket>>,
}

impl WebSocketTransport {
    /// Create a transport for `url` reporting to `events`
    ///
    /// Captures the current Tokio runtime; socket tasks are spawned on it.
    pub fn new(url: Url, events: EventSender) -> crate::Result<Self> {
        let runtime = Handle::try_current()?;
        Ok(Self {
            url,
            events,
            runtime,
            active: Mutex::new(None),
        })
    }

    /// Socket endpoint this transport connects to
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveSocket>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn command(&self, command: Outbound) {
        let active = self.active();
        let Some(socket) = active.as_ref() else {
            trace!(?command, "no socket task, dropping request");
            return;
        };
        if socket.commands.send(command).is_err() {
            trace!("socket task already finished, dropping request");
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) {
        if self.events.is_closed() {
            debug!(endpoint = %self.url, "event receiver gone, not connecting");
            return;
        }

        let mut active = self.active();
        if let Some(socket) = active.as_ref() {
            if socket.is_busy() {
                warn!(endpoint = %self.url, "connect requested while a socket is still active, ignoring");
                return;
            }
        }

        // A socket that already reported its terminal event winds down on its own
        let (commands, receiver) = mpsc::unbounded_channel();
        let ended = Arc::new(AtomicBool::new(false));
        let task = self.runtime.spawn(run_socket(
            self.url.clone(),
            self.events.clone(),
            receiver,
            Arc::clone(&ended),
        ));
        *active = Some(ActiveSocket {
            commands,
            task,
            ended,
        });
    }

    fn disconnect(&self) {
        self.command(Outbound::Close);
    }

    fn write_text(&self, text: String) {
        self.command(Outbound::Text(text));
    }

    fn write_ping(&self, payload: Vec<u8>) {
        self.command(Outbound::Ping(payload));
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(socket) = self.active().take() {
            socket.task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Socket Task
// ----------------------------------------------------------------------------

/// Emits at most one terminal event per socket task
///
/// The `ended` flag is raised before the event is sent, so a `connect()`
/// issued from the disconnect callback never sees this socket as busy.
struct TerminalGuard<'a> {
    events: &'a EventSender,
    ended: Arc<AtomicBool>,
}

impl<'a> TerminalGuard<'a> {
    fn new(events: &'a EventSender, ended: Arc<AtomicBool>) -> Self {
        Self { events, ended }
    }

    fn report(&mut self, event: TransportEvent) {
        debug_assert!(event.is_terminal());
        if self.ended.swap(true, Ordering::AcqRel) {
            debug!(kind = event.kind(), "terminal event already reported, dropping");
            return;
        }
        self.events.emit(event);
    }
}

fn socket_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Io(e) => TransportError::Io(e),
        other => TransportError::Protocol {
            reason: other.to_string(),
        },
    }
}

async fn run_socket(
    url: Url,
    events: EventSender,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    ended: Arc<AtomicBool>,
) {
    debug!(endpoint = %url, "opening websocket");
    let mut terminal = TerminalGuard::new(&events, ended);

    let handshake = connect_async(url.as_str());
    tokio::pin!(handshake);

    let (mut ws, response) = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok(pair) => break pair,
                Err(e) => {
                    terminal.report(TransportEvent::Error(TransportError::ConnectionFailed {
                        endpoint: url.to_string(),
                        reason: e.to_string(),
                    }));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Outbound::Close) | None => {
                    debug!(endpoint = %url, "connect cancelled before handshake completed");
                    terminal.report(TransportEvent::Cancelled);
                    return;
                }
                Some(other) => trace!(?other, "dropping request issued before handshake"),
            },
        }
    };

    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    info!(endpoint = %url, "websocket connected");
    events.emit(TransportEvent::Connected { headers });

    let mut accepting = true;

    loop {
        tokio::select! {
            command = commands.recv(), if accepting => {
                let result = match command {
                    Some(Outbound::Text(text)) => ws.send(Message::Text(text)).await,
                    Some(Outbound::Ping(payload)) => ws.send(Message::Ping(payload)).await,
                    Some(Outbound::Close) | None => {
                        accepting = false;
                        ws.close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        }))
                        .await
                    }
                };
                if let Err(e) = result {
                    terminal.report(TransportEvent::Error(socket_error(e)));
                    break;
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => events.emit(TransportEvent::Text(text)),
                Some(Ok(Message::Binary(data))) => events.emit(TransportEvent::Binary(data)),
                Some(Ok(Message::Ping(data))) => events.emit(TransportEvent::Ping(Some(data))),
                Some(Ok(Message::Pong(data))) => events.emit(TransportEvent::Pong(Some(data))),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    debug!(endpoint = %url, code, %reason, "close frame received");
                    terminal.report(TransportEvent::Disconnected { reason, code });
                    // Sends the queued close reply when the peer initiated
                    if let Err(e) = ws.flush().await {
                        trace!(error = %e, "close reply not flushed");
                    }
                    break;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    terminal.report(TransportEvent::Error(socket_error(e)));
                    break;
                }
                None => {
                    terminal.report(TransportEvent::Disconnected {
                        reason: "stream ended without close frame".to_string(),
                        code: ABNORMAL_CLOSURE,
                    });
                    break;
                }
            }
        }
    }

    debug!(endpoint = %url, "socket task finished");
}
