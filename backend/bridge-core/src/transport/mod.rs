//! Bridge transport: one local named channel, newline-delimited records,
//! at most one peer at a time.

pub mod channel;
pub mod connection;
pub mod dialer;
pub mod listener;
pub mod retry;
pub mod state;

pub use channel::channel_address;
pub use connection::Inbound;
pub use dialer::{Dialer, DialerInbound, DialerOptions};
pub use listener::{Listener, ListenerOptions};
pub use retry::{Retry, RetryDelay, RetryPolicy};
pub use state::{DialerState, ListenerState};
