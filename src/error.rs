//! Error taxonomy
//!
//! Storage failures and chat-completion failures are kept apart: the first
//! group is retried and degraded by the history layer, the second is shown
//! to the user as an error message.

use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The store cannot be reached or reported an error for the operation
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write went through but reading it back did not return what was written
    #[error("storage verification failed: {0}")]
    VerificationFailed(String),

    /// A stored value does not have the expected shape
    #[error("malformed data under '{key}': {reason}")]
    MalformedData { key: String, reason: String },
}

impl StorageError {
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self::Unavailable(reason.to_string())
    }
}

/// Failures at the chat-completions boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("Invalid API key. Please check your settings.")]
    InvalidCredential,

    #[error("Please set your OpenAI API key in the settings before chatting.")]
    MissingCredential,

    #[error("API Error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from AI service")]
    InvalidResponse,

    #[error("Failed to access storage. Please reload the app. ({0})")]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}
