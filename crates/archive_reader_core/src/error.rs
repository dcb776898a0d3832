//! crates/archive_reader_core/src/error.rs
//!
//! Error taxonomy for the reader core.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The login page no longer carries the anti-forgery token where we expect it.
    #[error("Could not find the authenticity token on the login page")]
    TokenNotFound,

    #[error("The archive rejected the supplied credentials")]
    AuthFailure,

    #[error("Network error: {0}")]
    Network(String),

    /// The fetched page did not contain a chapter body.
    #[error("No chapter content found at {0}")]
    ContentNotFound(String),

    #[error("Comments unavailable: {0}")]
    CommentsUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ReaderError {
    pub fn storage(err: PortError) -> Self {
        ReaderError::Storage(err.to_string())
    }
}

impl From<PortError> for ReaderError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Network(msg) => ReaderError::Network(msg),
            other => ReaderError::Network(other.to_string()),
        }
    }
}

pub type ReaderResult<T> = Result<T, ReaderError>;
