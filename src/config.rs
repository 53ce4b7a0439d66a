//! Typed configuration.
//!
//! Loads once at startup. The collection endpoint is the only required
//! setting; everything else has a working default. Construction is the one
//! place the crate fails fast — after that, every public operation is
//! infallible.

use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the collection service. Events are POSTed to
    /// `{endpoint}/analytics/collect`.
    pub endpoint: String,

    /// Path for the durable visitor-scope database. `None` keeps the
    /// persistent scope in memory: identity and consent simply won't
    /// survive a restart.
    pub state_path: Option<PathBuf>,
}

impl Config {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state_path: None,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: required_var("READERSHIP_ENDPOINT")?,
            state_path: std::env::var("READERSHIP_STATE_PATH")
                .ok()
                .map(PathBuf::from),
        })
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
