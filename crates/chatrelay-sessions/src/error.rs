use thiserror::Error;

/// Errors that can occur while persisting conversation state.
///
/// None of these reach the end user; a lost write degrades to a shorter history.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The background writer queue is at capacity.
    #[error("history write queue is full")]
    QueueFull,

    /// The background writer has shut down.
    #[error("history writer is closed")]
    WriterClosed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
