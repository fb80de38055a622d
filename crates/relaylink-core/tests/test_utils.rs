//! Test utilities for relaylink connection tests
//!
//! Provides a scripted transport, a recording log sink and a callback
//! recorder so the connection state machine can be driven event by event.

#![allow(dead_code)]

use relaylink_core::{
    event_channel, Connection, ConnectionCallbacks, ConnectionConfig, EventSender, LogSink,
    SessionUrl, Transport, TransportEvent,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_KEY: &str = "41791102999c339c844880b23950704cc43aa840f3739e365323cda4dfa89e7a";

/// Session URL pointing at an unroutable test bridge
pub fn test_session_url() -> SessionUrl {
    SessionUrl::parse(&format!(
        "wc:test-topic@1?bridge=https%3A%2F%2Fbridge.test&key={}",
        TEST_KEY
    ))
    .unwrap()
}

/// Let the connection's event task drain everything injected so far
///
/// Under paused time the runtime only advances the clock once every task is
/// idle, so this returns after all pending events were handled.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

/// Call made by the connection on its transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Disconnect,
    Text(String),
    Ping(Vec<u8>),
}

/// Transport that records every call and lets tests inject events
#[derive(Debug)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    events: EventSender,
}

impl MockTransport {
    pub fn new(events: EventSender) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Deliver an event as if the socket produced it
    pub fn inject(&self, event: TransportEvent) {
        self.events.emit(event);
    }

    pub fn inject_connected(&self) {
        self.inject(TransportEvent::Connected {
            headers: HashMap::new(),
        });
    }

    pub fn inject_disconnected(&self) {
        self.inject(TransportEvent::Disconnected {
            reason: "normal".to_string(),
            code: 1000,
        });
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::Ping(_)))
            .count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Transport for MockTransport {
    fn connect(&self) {
        self.record(TransportCall::Connect);
    }

    fn disconnect(&self) {
        self.record(TransportCall::Disconnect);
    }

    fn write_text(&self, text: String) {
        self.record(TransportCall::Text(text));
    }

    fn write_ping(&self, payload: Vec<u8>) {
        self.record(TransportCall::Ping(payload));
    }
}

// ----------------------------------------------------------------------------
// Recording Log Sink
// ----------------------------------------------------------------------------

/// Log sink keeping every line in memory
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn count(&self, line: &str) -> usize {
        self.lines().iter().filter(|l| l.as_str() == line).count()
    }
}

impl LogSink for RecordingLogSink {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

// ----------------------------------------------------------------------------
// Callback Recorder
// ----------------------------------------------------------------------------

/// Callback invocation observed by a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Connect,
    /// Display form of the cause, if any
    Disconnect(Option<String>),
    Text(String),
}

/// Records callback invocations in the order they happened
#[derive(Debug, Default)]
pub struct CallbackRecorder {
    reactions: Mutex<Vec<Reaction>>,
}

impl CallbackRecorder {
    pub fn reactions(&self) -> Vec<Reaction> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> Vec<Option<String>> {
        self.reactions()
            .into_iter()
            .filter_map(|r| match r {
                Reaction::Disconnect(cause) => Some(cause),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.reactions()
            .iter()
            .filter(|r| matches!(r, Reaction::Connect))
            .count()
    }

    /// Callbacks feeding this recorder
    pub fn callbacks(self: &Arc<Self>) -> ConnectionCallbacks {
        let on_connect = Arc::clone(self);
        let on_disconnect = Arc::clone(self);
        let on_text = Arc::clone(self);
        ConnectionCallbacks::new()
            .on_connect(move || on_connect.push(Reaction::Connect))
            .on_disconnect(move |cause| {
                on_disconnect.push(Reaction::Disconnect(cause.map(|e| e.to_string())))
            })
            .on_text(move |text| on_text.push(Reaction::Text(text)))
    }

    fn push(&self, reaction: Reaction) {
        self.reactions.lock().unwrap().push(reaction);
    }
}

// ----------------------------------------------------------------------------
// Test Harness
// ----------------------------------------------------------------------------

/// A connection wired to mocks
pub struct TestConnection {
    pub connection: Connection,
    pub transport: Arc<MockTransport>,
    pub sink: Arc<RecordingLogSink>,
    pub recorder: Arc<CallbackRecorder>,
}

/// Build a connection over a [`MockTransport`]; needs a Tokio runtime
pub fn create_test_connection(heartbeat_interval: Duration) -> TestConnection {
    let (sender, receiver) = event_channel();
    let transport = Arc::new(MockTransport::new(sender));
    let sink = Arc::new(RecordingLogSink::default());
    let recorder = Arc::new(CallbackRecorder::default());

    let connection = Connection::builder(test_session_url())
        .config(ConnectionConfig::with_heartbeat_interval(heartbeat_interval))
        .callbacks(recorder.callbacks())
        .log_sink(sink.clone())
        .build_with_transport(Arc::clone(&transport), receiver)
        .unwrap();

    TestConnection {
        connection,
        transport,
        sink,
        recorder,
    }
}
