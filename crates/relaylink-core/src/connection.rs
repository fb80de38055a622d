//! Bridge connection
//!
//! A [`Connection`] owns one transport, tracks whether it is open, keeps it
//! alive with a heartbeat and hands every transport event to the caller's
//! callbacks from a single ordered task.
//!
//! State transitions happen only on that task:
//!
//! | Event                        | Effect                                          |
//! |------------------------------|-------------------------------------------------|
//! | `Connected`                  | open, start heartbeat, `on_connect()`           |
//! | `Disconnected` / `Cancelled` | closed, stop heartbeat, `on_disconnect(None)`   |
//! | `Error(e)`                   | closed, stop heartbeat, `on_disconnect(Some(e))`|
//! | `Text(t)`                    | `on_text(t)`                                    |
//! | anything else                | traced only                                     |

use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::config::ConnectionConfig;
use crate::errors::TransportError;
use crate::heartbeat::{Heartbeat, HeartbeatTarget};
use crate::serializer::{JsonRpcSerializer, MessageSerializer};
use crate::session_url::SessionUrl;
use crate::transport::{EventReceiver, Transport, TransportEvent};
use crate::wire_log::{describe_outgoing, heartbeat_line, LogSink, TracingLogSink};

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Constructed, never connected
    Idle,
    /// Transport reported a successful connect
    Open,
    /// Last cycle ended with a terminal event
    Closed,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Open,
            2 => ConnectionState::Closed,
            _ => ConnectionState::Idle,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

// ----------------------------------------------------------------------------
// Callbacks
// ----------------------------------------------------------------------------

type ConnectCallback = Box<dyn Fn() + Send + Sync>;
type DisconnectCallback = Box<dyn Fn(Option<TransportError>) + Send + Sync>;
type TextCallback = Box<dyn Fn(String) + Send + Sync>;

/// Caller reactions to connection events
///
/// All three run on the connection's event task, one at a time, in the order
/// the transport produced the events.
#[derive(Default)]
pub struct ConnectionCallbacks {
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    on_text: Option<TextCallback>,
}

impl ConnectionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the transport reports a successful connect
    pub fn on_connect<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connect = Some(Box::new(callback));
        self
    }

    /// Called on every terminal event; the cause is set only for transport errors
    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<TransportError>) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Box::new(callback));
        self
    }

    /// Called for every received text frame
    pub fn on_text<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_text = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ConnectionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCallbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_text", &self.on_text.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Shared Connection State
// ----------------------------------------------------------------------------

/// State shared by the handle, the event task and the heartbeat
struct Shared {
    url: SessionUrl,
    config: ConnectionConfig,
    transport: Box<dyn Transport>,
    state: AtomicU8,
    heartbeat: Mutex<Option<Heartbeat>>,
    callbacks: ConnectionCallbacks,
    serializer: Arc<dyn MessageSerializer>,
    log_sink: Arc<dyn LogSink>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn heartbeat(&self) -> MutexGuard<'_, Option<Heartbeat>> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let heartbeat = Heartbeat::start(Arc::downgrade(self), self.config.heartbeat_interval);
        debug!(period = ?heartbeat.period(), "heartbeat started");
        if let Some(previous) = self.heartbeat().replace(heartbeat) {
            debug!("replacing heartbeat left over from a previous cycle");
            previous.stop();
        }
    }

    fn stop_heartbeat(&self) {
        if let Some(heartbeat) = self.heartbeat().take() {
            trace!(running = heartbeat.is_running(), "stopping heartbeat");
            heartbeat.stop();
        }
    }

    fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        debug!(kind = event.kind(), terminal = event.is_terminal(), "transport event");

        match event {
            TransportEvent::Connected { headers } => {
                trace!(?headers, "handshake headers");
                self.set_state(ConnectionState::Open);
                self.start_heartbeat();
                info!("connection open");
                if let Some(callback) = &self.callbacks.on_connect {
                    callback();
                }
            }
            TransportEvent::Disconnected { reason, code } => {
                info!(code, %reason, "connection closed by transport");
                self.end_cycle(None);
            }
            TransportEvent::Cancelled => {
                info!("connection cancelled");
                self.end_cycle(None);
            }
            TransportEvent::Error(error) => {
                warn!(%error, "connection failed");
                self.end_cycle(Some(error));
            }
            TransportEvent::Text(text) => {
                if let Some(callback) = &self.callbacks.on_text {
                    callback(text);
                }
            }
            TransportEvent::Binary(data) => trace!(len = data.len(), "binary frame ignored"),
            TransportEvent::Ping(data) => trace!(len = data.map_or(0, |d| d.len()), "ping received"),
            TransportEvent::Pong(data) => trace!(len = data.map_or(0, |d| d.len()), "pong received"),
            TransportEvent::ViabilityChanged(viable) => debug!(viable, "path viability changed"),
            TransportEvent::ReconnectSuggested(better) => {
                debug!(better, "transport suggests reconnecting")
            }
        }
    }

    fn end_cycle(&self, cause: Option<TransportError>) {
        self.set_state(ConnectionState::Closed);
        self.stop_heartbeat();
        if let Some(callback) = &self.callbacks.on_disconnect {
            callback(cause);
        }
    }
}

impl HeartbeatTarget for Shared {
    fn beat(&self) {
        if !self.is_open() {
            trace!("heartbeat fired on a closed connection, skipping");
            return;
        }
        self.log_sink.log(&heartbeat_line());
        self.transport.write_ping(Vec::new());
    }
}

/// Serial delivery loop; the only place connection state is written
async fn run_events(shared: Weak<Shared>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_event(event);
    }
    trace!("event loop finished");
}

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

/// Persistent text connection to one bridge endpoint
///
/// `open`, `close` and `send` never block and never fail; outcomes arrive
/// through the callbacks. Dropping the connection stops its event task and
/// heartbeat.
pub struct Connection {
    shared: Arc<Shared>,
    event_task: JoinHandle<()>,
}

impl Connection {
    /// Start building a connection to `url`
    pub fn builder(url: SessionUrl) -> ConnectionBuilder {
        ConnectionBuilder::new(url)
    }

    /// Connection over the WebSocket transport with default serializer and sink
    #[cfg(feature = "websocket")]
    pub fn new(
        url: SessionUrl,
        config: ConnectionConfig,
        callbacks: ConnectionCallbacks,
    ) -> crate::Result<Self> {
        Self::builder(url).config(config).callbacks(callbacks).build()
    }

    /// Ask the transport to connect
    pub fn open(&self) {
        debug!(endpoint = %self.shared.url.endpoint_label(), "open requested");
        self.shared.transport.connect();
    }

    /// Ask the transport to disconnect; state changes once it confirms
    pub fn close(&self) {
        debug!(endpoint = %self.shared.url.endpoint_label(), "close requested");
        self.shared.transport.disconnect();
    }

    /// Send a text frame; silently dropped unless the connection is open
    pub fn send(&self, text: impl Into<String>) {
        if !self.shared.is_open() {
            return;
        }

        let text = text.into();
        let line = describe_outgoing(&text, &self.shared.url, self.shared.serializer.as_ref());
        self.shared.transport.write_text(text);
        self.shared.log_sink.log(&line);
    }

    /// Whether the transport reported a connect with no terminal event since
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Session URL this connection was built for
    pub fn endpoint(&self) -> &SessionUrl {
        &self.shared.url
    }

    /// Interval between keepalive pings
    pub fn heartbeat_interval(&self) -> Duration {
        self.shared.config.heartbeat_interval
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.shared.url.endpoint_label())
            .field("state", &self.shared.state())
            .field("config", &self.shared.config)
            .field("callbacks", &self.shared.callbacks)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.event_task.abort();
        self.shared.stop_heartbeat();
    }
}

// ----------------------------------------------------------------------------
// Connection Builder
// ----------------------------------------------------------------------------

/// Builder for [`Connection`]
pub struct ConnectionBuilder {
    url: SessionUrl,
    config: ConnectionConfig,
    callbacks: ConnectionCallbacks,
    serializer: Option<Arc<dyn MessageSerializer>>,
    log_sink: Option<Arc<dyn LogSink>>,
}

impl ConnectionBuilder {
    pub fn new(url: SessionUrl) -> Self {
        Self {
            url,
            config: ConnectionConfig::default(),
            callbacks: ConnectionCallbacks::default(),
            serializer: None,
            log_sink: None,
        }
    }

    /// Replace the connection configuration
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Replace all callbacks at once
    pub fn callbacks(mut self, callbacks: ConnectionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn on_connect<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks = self.callbacks.on_connect(callback);
        self
    }

    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<TransportError>) + Send + Sync + 'static,
    {
        self.callbacks = self.callbacks.on_disconnect(callback);
        self
    }

    pub fn on_text<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.callbacks = self.callbacks.on_text(callback);
        self
    }

    /// Serializer used to render outgoing frames in the wire log
    pub fn serializer(mut self, serializer: Arc<dyn MessageSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Sink receiving wire log lines
    pub fn log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(log_sink);
        self
    }

    /// Build over a WebSocket transport to the bridge's socket URL
    #[cfg(feature = "websocket")]
    pub fn build(self) -> crate::Result<Connection> {
        let socket_url = self.url.socket_url()?;
        let (events_tx, events_rx) = crate::transport::event_channel();
        let transport = crate::transport::websocket::WebSocketTransport::new(socket_url, events_tx)?;
        self.build_with_transport(transport, events_rx)
    }

    /// Build over any transport; `events` must be fed by that transport
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build_with_transport<T: Transport>(
        self,
        transport: T,
        events: EventReceiver,
    ) -> crate::Result<Connection> {
        self.config.validate()?;
        let runtime = Handle::try_current()?;

        let label = self.url.endpoint_label();
        let shared = Arc::new(Shared {
            url: self.url,
            config: self.config,
            transport: Box::new(transport),
            state: AtomicU8::new(ConnectionState::Idle.as_u8()),
            heartbeat: Mutex::new(None),
            callbacks: self.callbacks,
            serializer: self
                .serializer
                .unwrap_or_else(|| Arc::new(JsonRpcSerializer::new())),
            log_sink: self.log_sink.unwrap_or_else(|| Arc::new(TracingLogSink)),
        });

        let span = info_span!("connection", endpoint = %label);
        let event_task = runtime.spawn(run_events(Arc::downgrade(&shared), events).instrument(span));

        debug!(endpoint = %label, "connection built");
        Ok(Connection { shared, event_task })
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("custom_serializer", &self.serializer.is_some())
            .field("custom_log_sink", &self.log_sink.is_some())
            .finish()
    }
}
