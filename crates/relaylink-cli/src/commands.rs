//! Command handlers for the relaylink CLI

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use relaylink_core::{describe_outgoing, Connection, ConnectionConfig, JsonRpcSerializer, SessionUrl};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// How long Ctrl-C waits for the bridge to confirm the close
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Decoding context for `describe` when no session URL is given
const PLACEHOLDER_SESSION: &str = "wc:local@1?bridge=http%3A%2F%2Flocalhost&key=0000000000000000000000000000000000000000000000000000000000000000";

/// Connection callbacks forwarded to the command loop
#[derive(Debug)]
enum SessionEvent {
    Connected,
    Disconnected(Option<String>),
    Text(String),
}

/// JSON view of a session URL printed by `inspect`
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub topic: String,
    pub version: String,
    pub bridge: String,
    pub socket_url: String,
    pub endpoint: String,
    pub key_length: usize,
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Connect {
                session_url,
                heartbeat_secs,
                fast_heartbeat,
                send,
            } => {
                let connection_config = config.connection_config(heartbeat_secs, fast_heartbeat);
                Self::handle_connect_command(session_url, connection_config, send).await
            }
            Commands::Inspect { session_url } => Self::handle_inspect_command(&session_url),
            Commands::Describe {
                payload,
                session_url,
            } => Self::handle_describe_command(&payload, session_url),
        }
    }

    /// Handle the connect command
    async fn handle_connect_command(
        session_url: SessionUrl,
        config: ConnectionConfig,
        initial: Vec<String>,
    ) -> Result<()> {
        info!(
            "Connecting to {} (heartbeat every {:?})",
            session_url.endpoint_label(),
            config.heartbeat_interval
        );

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let on_connect = events_tx.clone();
        let on_disconnect = events_tx.clone();
        let on_text = events_tx;

        let connection = Connection::builder(session_url)
            .config(config)
            .on_connect(move || {
                let _ = on_connect.send(SessionEvent::Connected);
            })
            .on_disconnect(move |cause| {
                let _ = on_disconnect.send(SessionEvent::Disconnected(cause.map(|e| e.to_string())));
            })
            .on_text(move |text| {
                let _ = on_text.send(SessionEvent::Text(text));
            })
            .build()?;
        connection.open();

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SessionEvent::Connected) => {
                        info!("Connected");
                        for text in &initial {
                            connection.send(text.as_str());
                        }
                    }
                    Some(SessionEvent::Text(text)) => println!("{}", text),
                    Some(SessionEvent::Disconnected(None)) | None => {
                        info!("Bridge closed the connection");
                        return Ok(());
                    }
                    Some(SessionEvent::Disconnected(Some(cause))) => {
                        return Err(CliError::Disconnected(cause));
                    }
                },
                line = stdin.next_line(), if stdin_open => match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if !connection.is_open() {
                            warn!("Not connected, dropping input");
                        }
                        connection.send(line);
                    }
                    None => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                },
                _ = &mut ctrl_c => {
                    info!("Interrupted, closing connection");
                    connection.close();
                    return Self::await_close(&mut events).await;
                }
            }
        }
    }

    /// Wait for the terminal event after a close request
    async fn await_close(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Result<()> {
        let wait = async {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Text(text) => println!("{}", text),
                    SessionEvent::Connected => {}
                    SessionEvent::Disconnected(_) => return,
                }
            }
        };

        if timeout(SHUTDOWN_GRACE, wait).await.is_err() {
            warn!("Bridge did not confirm close within {:?}", SHUTDOWN_GRACE);
        }
        Ok(())
    }

    /// Handle the inspect command
    fn handle_inspect_command(session_url: &SessionUrl) -> Result<()> {
        let summary = session_summary(session_url)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }

    /// Handle the describe command
    fn handle_describe_command(payload: &str, session_url: Option<SessionUrl>) -> Result<()> {
        println!("{}", describe_payload(payload, session_url)?);
        Ok(())
    }
}

/// Build the `inspect` view of a session URL; the key is reduced to its length
pub fn session_summary(session_url: &SessionUrl) -> Result<SessionSummary> {
    Ok(SessionSummary {
        topic: session_url.topic().to_string(),
        version: session_url.version().to_string(),
        bridge: session_url.bridge().to_string(),
        socket_url: session_url.socket_url()?.to_string(),
        endpoint: session_url.endpoint_label(),
        key_length: session_url.key().len(),
    })
}

/// Wire log line for `payload`, decoded in the context of `session_url`
pub fn describe_payload(payload: &str, session_url: Option<SessionUrl>) -> Result<String> {
    let session_url = match session_url {
        Some(url) => url,
        None => SessionUrl::parse(PLACEHOLDER_SESSION)?,
    };
    Ok(describe_outgoing(payload, &session_url, &JsonRpcSerializer))
}
