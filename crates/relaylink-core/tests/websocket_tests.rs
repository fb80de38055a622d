//! End-to-end tests against a loopback WebSocket bridge

use futures::{SinkExt, StreamExt};
use relaylink_core::{Connection, ConnectionState, SessionUrl};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::accept_async;

mod test_utils;
use test_utils::{RecordingLogSink, Reaction, TEST_KEY};

const WAIT: Duration = Duration::from_secs(5);

/// How the loopback bridge behaves once a client is connected
#[derive(Debug, Clone, Copy)]
enum BridgeMode {
    /// Echo text frames, report pings, answer close
    Echo,
    /// Send one greeting then close with 4000
    GreetAndClose,
}

/// Spawn a bridge serving every client that connects
///
/// Pings received from any client are forwarded to the returned channel.
async fn spawn_bridge(mode: BridgeMode) -> (u16, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (pings_tx, pings_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_client(stream, mode, pings_tx.clone()));
        }
    });

    (port, pings_rx)
}

async fn serve_client(
    stream: TcpStream,
    mode: BridgeMode,
    pings: mpsc::UnboundedSender<Vec<u8>>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    if let BridgeMode::GreetAndClose = mode {
        ws.send(Message::Text("welcome".to_string())).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::from(4000),
            reason: "bye".into(),
        }))
        .await
        .unwrap();
    }

    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) => {
                if ws.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Message::Ping(payload) => {
                let _ = pings.send(payload);
            }
            _ => {}
        }
    }
}

fn session_for(port: u16) -> SessionUrl {
    SessionUrl::parse(&format!(
        "wc:e2e-topic@1?bridge=http%3A%2F%2F127.0.0.1%3A{}&key={}",
        port, TEST_KEY
    ))
    .unwrap()
}

/// Build a real connection whose callbacks feed a channel
fn connect_to(
    port: u16,
    heartbeat: Duration,
    sink: Arc<RecordingLogSink>,
) -> (Connection, mpsc::UnboundedReceiver<Reaction>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let on_connect = tx.clone();
    let on_disconnect = tx.clone();
    let on_text = tx;

    let connection = Connection::builder(session_for(port))
        .heartbeat_interval(heartbeat)
        .log_sink(sink)
        .on_connect(move || {
            let _ = on_connect.send(Reaction::Connect);
        })
        .on_disconnect(move |cause| {
            let _ = on_disconnect.send(Reaction::Disconnect(cause.map(|e| e.to_string())));
        })
        .on_text(move |text| {
            let _ = on_text.send(Reaction::Text(text));
        })
        .build()
        .unwrap();

    (connection, rx)
}

async fn next_reaction(rx: &mut mpsc::UnboundedReceiver<Reaction>) -> Reaction {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_echo_round_trip_and_clean_close() {
    let (port, _pings) = spawn_bridge(BridgeMode::Echo).await;
    let sink = Arc::new(RecordingLogSink::default());
    let (connection, mut reactions) = connect_to(port, Duration::from_secs(30), sink.clone());

    connection.open();
    assert_eq!(next_reaction(&mut reactions).await, Reaction::Connect);
    assert_eq!(connection.state(), ConnectionState::Open);

    connection.send("hello");
    assert_eq!(
        next_reaction(&mut reactions).await,
        Reaction::Text("hello".to_string())
    );
    assert_eq!(sink.lines(), vec!["==> hello".to_string()]);

    connection.close();
    assert_eq!(next_reaction(&mut reactions).await, Reaction::Disconnect(None));
    assert_eq!(connection.state(), ConnectionState::Closed);

    // Dropped silently once closed
    connection.send("late");
    assert_eq!(sink.lines().len(), 1);
}

#[tokio::test]
async fn test_heartbeat_pings_reach_bridge() {
    let (port, mut pings) = spawn_bridge(BridgeMode::Echo).await;
    let sink = Arc::new(RecordingLogSink::default());
    let (connection, mut reactions) = connect_to(port, Duration::from_millis(50), sink.clone());

    connection.open();
    assert_eq!(next_reaction(&mut reactions).await, Reaction::Connect);

    let payload = timeout(WAIT, pings.recv()).await.unwrap().unwrap();
    assert!(payload.is_empty());
    assert!(sink.count("==> ping") >= 1);

    connection.close();
    assert_eq!(next_reaction(&mut reactions).await, Reaction::Disconnect(None));
}

#[tokio::test]
async fn test_bridge_initiated_close() {
    let (port, _pings) = spawn_bridge(BridgeMode::GreetAndClose).await;
    let sink = Arc::new(RecordingLogSink::default());
    let (connection, mut reactions) = connect_to(port, Duration::from_secs(30), sink);

    connection.open();
    assert_eq!(next_reaction(&mut reactions).await, Reaction::Connect);
    assert_eq!(
        next_reaction(&mut reactions).await,
        Reaction::Text("welcome".to_string())
    );
    assert_eq!(next_reaction(&mut reactions).await, Reaction::Disconnect(None));
    assert!(!connection.is_open());
}

#[tokio::test]
async fn test_unreachable_bridge_reports_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let sink = Arc::new(RecordingLogSink::default());
    let (connection, mut reactions) = connect_to(port, Duration::from_secs(30), sink);

    connection.open();
    match next_reaction(&mut reactions).await {
        Reaction::Disconnect(Some(cause)) => assert!(cause.contains("127.0.0.1")),
        other => panic!("expected error disconnect, got {:?}", other),
    }
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reopen_cycles_back_to_back() {
    let (port, mut pings) = spawn_bridge(BridgeMode::Echo).await;
    let sink = Arc::new(RecordingLogSink::default());
    let (connection, mut reactions) = connect_to(port, Duration::from_millis(50), sink.clone());

    for cycle in 0..10 {
        // Reopen straight away, as a caller reacting to on_disconnect would
        connection.open();
        assert_eq!(
            next_reaction(&mut reactions).await,
            Reaction::Connect,
            "cycle {} did not reconnect",
            cycle
        );
        assert!(connection.is_open());

        while pings.try_recv().is_ok() {}
        let payload = timeout(WAIT, pings.recv()).await.unwrap().unwrap();
        assert!(payload.is_empty());

        connection.close();
        assert_eq!(next_reaction(&mut reactions).await, Reaction::Disconnect(None));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    assert!(sink.count("==> ping") >= 10);
}
