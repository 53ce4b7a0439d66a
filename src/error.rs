//! Error types for readership.
//!
//! Internal only: no error escapes a public entry point. Telemetry is
//! best-effort, so failures are logged at debug level and swallowed at
//! the engine boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
