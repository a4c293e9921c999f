//! Error types for the KOPIS open-data client.
//!
//! [`KopisError`] never leaves the client's [`PerformanceSource`](super::PerformanceSource)
//! implementation: the source methods log it and degrade to "no data".
//! It is still public so callers of the fallible `list`/`detail` methods can
//! inspect what went wrong.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KopisError {
    /// The upstream answered with a non-success HTTP status.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Transport failure (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The body was not the expected `<dbs>` document.
    #[error("failed to parse response: {0}")]
    ParseError(#[from] quick_xml::DeError),

    #[error("no KOPIS service key configured")]
    MissingApiKey,

    #[error("invalid KOPIS base URL: {0}")]
    InvalidBaseUrl(String),
}
