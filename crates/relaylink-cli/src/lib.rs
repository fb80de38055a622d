//! relaylink CLI library
//!
//! Command-line front end over `relaylink-core`: connect to a session bridge,
//! inspect session URLs and preview wire log output.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
