pub mod codec;
pub mod config;
pub mod executor;
pub mod hook;
pub mod transport;

pub use codec::CodecError;
pub use config::ConfigError;
pub use executor::ExecutorError;
pub use hook::HookError;
pub use transport::TransportError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Codec(#[from] codec::CodecError),

    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    #[error(transparent)]
    Executor(#[from] executor::ExecutorError),

    #[error(transparent)]
    Hook(#[from] hook::HookError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
