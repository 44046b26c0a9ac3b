//! Error types for the acceptance harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("no selector candidate matched for {target}")]
    NotFound { target: String },

    #[error("timed out after {timeout_ms}ms waiting for {target} to become actionable")]
    InteractionTimeout { target: String, timeout_ms: u64 },

    #[error("element for {target} is present but disabled")]
    InteractionBlocked { target: String },

    #[error("navigation timeout: expected URL containing '{expected}', reached '{reached}'")]
    NavigationTimeout { expected: String, reached: String },

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("endpoint {url} returned HTTP {status}")]
    Transport { url: String, status: u16 },

    #[error("browser session error: {0}")]
    Session(String),

    #[error("browser protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    /// Whether the browser/session infrastructure itself failed. Fatal
    /// errors propagate; everything else is converted to an issue at the
    /// flow boundary and the run keeps gathering information.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::Session(_) | HarnessError::Cdp(_))
    }
}
