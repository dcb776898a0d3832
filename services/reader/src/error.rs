//! services/reader/src/error.rs
//!
//! Defines the primary error type for the reader application.

use crate::config::ConfigError;
use archive_reader_core::{PortError, ReaderError};

/// The primary error type for the `reader` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A session, chapter or comments failure from the reader core.
    #[error("{0}")]
    Reader(#[from] ReaderError),

    /// Represents an error that propagated up from one of the adapters.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
