//! Structural checks run before every provider call.

use thiserror::Error;

use super::types::Message;

/// A conversation that cannot be sent to any backend.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("messages array cannot be empty")]
    Empty,

    #[error("message {index} has no content")]
    EmptyContent { index: usize },

    #[error("invalid message role '{0}', must be system, user, or assistant")]
    InvalidRole(String),
}

/// Validate a conversation history.
///
/// Roles are enforced by [`Role`](super::Role) itself; parsing an unknown
/// role string fails with [`ValidationError::InvalidRole`].
pub fn validate_messages(messages: &[Message]) -> Result<(), ValidationError> {
    if messages.is_empty() {
        return Err(ValidationError::Empty);
    }

    for (index, message) in messages.iter().enumerate() {
        if message.content.is_empty() {
            return Err(ValidationError::EmptyContent { index });
        }
    }

    Ok(())
}
