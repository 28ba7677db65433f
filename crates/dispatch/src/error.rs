use {sandbar_common::UnsupportedKind, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    UnsupportedKind(#[from] UnsupportedKind),

    #[error(transparent)]
    Sandbox(#[from] sandbar_sandbox::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

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
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::UnsupportedKind(UnsupportedKind::new(kind))
    }

    pub fn is_unsupported_kind(&self) -> bool {
        matches!(self, Self::UnsupportedKind(_))
    }
}

impl sandbar_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

sandbar_common::impl_context!();
