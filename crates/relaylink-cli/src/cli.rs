//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use relaylink_core::SessionUrl;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a session bridge, send stdin lines and print received text
    Connect {
        /// Session URL (wc:<topic>@<version>?bridge=...&key=...)
        session_url: SessionUrl,
        /// Seconds between keepalive pings (overrides the config file)
        #[arg(long)]
        heartbeat_secs: Option<u64>,
        /// Ping every 5 seconds, for bridges that drop idle sockets quickly
        #[arg(long, conflicts_with = "heartbeat_secs")]
        fast_heartbeat: bool,
        /// Text to send once connected; may be repeated
        #[arg(long = "send", value_name = "TEXT")]
        send: Vec<String>,
    },
    /// Print a parsed session URL as JSON
    Inspect {
        /// Session URL to inspect
        session_url: SessionUrl,
    },
    /// Print the wire log line a send of PAYLOAD would produce
    Describe {
        /// Outgoing payload
        payload: String,
        /// Session URL used as decoding context
        #[arg(long)]
        session_url: Option<SessionUrl>,
    },
}
