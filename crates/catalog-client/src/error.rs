//! Error types for catalog queries.

use thiserror::Error;

/// Errors surfaced by catalog searches.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request failed local validation before any network I/O.
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    /// The endpoint could not be reached within the retry budget.
    #[error("catalog unreachable after {attempts} attempts: {message}")]
    Unreachable { attempts: u32, message: String },

    /// The catalog refused our credentials. Not retried.
    #[error("catalog authentication failed: {0}")]
    AuthFailed(String),

    /// The catalog accepted the connection but rejected the request.
    #[error("catalog rejected the request: {0}")]
    Rejected(String),

    /// The response body could not be interpreted.
    #[error("malformed catalog response: {0}")]
    MalformedResponse(String),
}
