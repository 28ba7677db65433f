use {sandbar_common::UnsupportedKind, thiserror::Error};

use crate::types::JobState;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    UnsupportedKind(#[from] UnsupportedKind),

    #[error("job not found: {id}")]
    NotFound { id: String },

    #[error("job already exists: {id}")]
    Duplicate { id: String },

    #[error("job {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobState,
        to: JobState,
    },

    #[error("job registry is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Dispatch(#[from] sandbar_dispatch::Error),

    #[error(transparent)]
    ContextStore(#[from] sandbar_context::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

impl sandbar_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

sandbar_common::impl_context!();
