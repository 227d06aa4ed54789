pub mod codec;
pub mod config;
pub mod error;
pub mod hooks;
pub mod monitor;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod tests;

/// Sent in the `connected` handshake.
pub const BRIDGE_PROTOCOL_VERSION: &str = "2.0.0";
pub const BRIDGE_NAME: &str = "command-bridge";
pub const BRIDGE_IDENT: &str =
    const_format::concatcp!(BRIDGE_NAME, "/", BRIDGE_PROTOCOL_VERSION);

/// Appended to connect failures once retries are exhausted.
pub const BRIDGE_NOT_RUNNING_HINT: &str =
    "Is the host application running with the bridge started?";
