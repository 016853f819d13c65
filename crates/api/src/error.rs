//! Error type for GitHub API operations.

use thiserror::Error;

/// Failures surfaced by the GitHub client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid client configuration: {0}")]
    Config(String),
}
