use common::ErrorLocation;

use thiserror::Error as ThisError;

/// Failure reported by the host's command/variable executor.
///
/// The hook adapter turns every one of these into an `error` envelope.
#[derive(Debug, ThisError)]
pub enum ExecutorError {
    #[error("Execution Failed: {message} {location}")]
    Failed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Unknown Variable: {name} {location}")]
    UnknownVariable {
        name: String,
        location: ErrorLocation,
    },
}

impl ExecutorError {
    /// Message without the location suffix, suitable for an envelope.
    pub fn reason(&self) -> String {
        match self {
            ExecutorError::Failed { message, .. } => message.clone(),
            ExecutorError::UnknownVariable { name, .. } => format!("unknown variable {name}"),
        }
    }
}
