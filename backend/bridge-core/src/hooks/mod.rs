//! Host-side event hooks and request dispatch.

pub mod adapter;
pub mod events;
pub mod executor;

pub use adapter::{BridgeHost, HookAdapter};
pub use events::{HostEvent, HostEventSink, HostEventSource};
pub use executor::HostExecutor;
