//! Primitives shared by every crate in the command bridge workspace.
//!
//! Each error enum in the workspace records where it was raised with an
//! [`ErrorLocation`], so a log line or an `error` envelope can point back at
//! the exact call site without a backtrace.

pub mod error;

pub use error::error_location::ErrorLocation;
