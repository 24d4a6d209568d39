//! Common error types for factory-assist.

use crate::ids::{MessageId, ThreadId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the conversation model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No thread with the given ID exists.
    #[error("thread not found: {0}")]
    ThreadNotFound(ThreadId),

    /// The referenced message is not part of the thread's history.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
