use bridge_core::BRIDGE_PROTOCOL_VERSION;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "command-bridge")]
#[command(version = BRIDGE_PROTOCOL_VERSION)]
#[command(about = "Stream host application command events over a local channel")]
pub struct Cli {
    /// Directory holding bridge.json (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Channel name, overriding settings and environment
    #[arg(long, global = true)]
    pub channel: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a simulated host that serves the channel and replays a scripted session
    HostSim {
        /// Delay between simulated events
        #[arg(long, default_value_t = 1500)]
        interval_ms: u64,

        /// Host version reported in the handshake
        #[arg(long, default_value = "SimCAD 2025")]
        host_version: String,
    },

    /// Connect to a host, log its events, and keep session statistics
    Monitor {
        /// Write the session report here on exit
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Send a single request to the host and print the first reply
    Send {
        #[command(subcommand)]
        request: Request,
    },
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Request {
    /// Queue a command line for execution
    Execute { command: String },

    /// Evaluate a script expression
    Lisp { expression: String },

    /// Read a system variable
    Getvar { name: String },

    /// Write a system variable; the value is parsed as JSON, else taken as text
    Setvar {
        name: String,
        #[arg(value_parser = parse_value)]
        value: Value,
    },

    Ping,
}

/// `511` becomes a number, `"0"` a string, and bare `Walls` falls back to a string.
pub fn parse_value(raw: &str) -> Result<Value, String> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}
