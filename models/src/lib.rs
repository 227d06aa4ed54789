//! Data types exchanged over the command bridge.
//!
//! This crate contains pure data structures: the envelope that travels over
//! the channel, the per-command history record kept by the statistics engine,
//! and the exported session report. Models have no I/O and no business
//! logic beyond derived values (durations, kind lookups).
//!
//! ## Architecture
//!
//! - **models** (this crate): wire and report data
//! - **bridge-core**: codec, transport, host adapter, statistics engine
//! - **command-bridge**: binary wiring everything together

pub mod envelope;
pub mod history;
pub mod kind;
pub mod report;

pub use envelope::{Envelope, Payload};
pub use history::{CommandHistoryItem, CommandStatus};
pub use kind::MessageKind;
pub use report::{SessionExport, SessionStatistics};

#[cfg(test)]
mod tests;
