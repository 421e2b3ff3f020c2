use std::error::Error as _;

use shared::domain::ItemId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("reset is not available for this list")]
    ResetUnavailable,
    #[error("failed to load items")]
    Load { source: anyhow::Error },
    #[error("failed to create item")]
    Create { source: anyhow::Error },
    #[error("failed to update item {id}")]
    Update { id: ItemId, source: anyhow::Error },
    #[error("failed to delete item {id}")]
    Delete { id: ItemId, source: anyhow::Error },
    #[error("failed to reseed backing store")]
    Reseed { source: anyhow::Error },
}

impl ControllerError {
    /// One-line message with every cause, for status lines and events.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut cause = self.source();
        while let Some(error) = cause {
            message.push_str(": ");
            message.push_str(&error.to_string());
            cause = error.source();
        }
        message
    }
}
