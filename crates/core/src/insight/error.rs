//! Error taxonomy for the insight provider boundary.
//!
//! None of these are fatal to the session: the server maps every variant
//! to the same generic "could not load" notice and leaves prior state
//! untouched.

use thiserror::Error;

/// Failure modes of a provider call
#[derive(Debug, Error)]
pub enum InsightError {
    /// Transport-level failure (connect, timeout, dropped stream)
    #[error("insight request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("provider returned status {status}: {message}")]
    Provider { status: u16, message: String },

    /// The provider answered, but not in the requested shape
    #[error("provider response was not in the expected shape: {0}")]
    Malformed(String),

    /// No API key in the environment
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    /// Rejected before any request was issued
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}
