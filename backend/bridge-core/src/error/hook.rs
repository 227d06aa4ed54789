use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum HookError {
    #[error("Subscribe Error: {message} {location}")]
    Subscribe {
        message: String,
        location: ErrorLocation,
    },
}
