//! Error types for virtual array construction.

use thiserror::Error;

/// Errors raised while building or narrowing a virtual array.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No asset intersects the requested bounds/time range.
    ///
    /// Raised instead of returning an empty-but-successful array.
    #[error("no assets intersect the requested bounds/time range")]
    EmptyIntersection,

    /// A requested band is not supplied by any asset.
    #[error("requested band '{0}' is not supplied by any asset")]
    MissingBand(String),

    /// The assets do not share a single source CRS.
    #[error("assets use inconsistent coordinate systems: {found:?}")]
    CrsMismatch { found: Vec<String> },

    /// Build parameters failed validation.
    #[error("invalid build parameters: {0}")]
    InvalidParams(String),
}
