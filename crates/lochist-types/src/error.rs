//! Error types for data validation in lochist-types.

use thiserror::Error;

/// Errors raised when a location sample or request fails validation.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Latitude is outside `[-90, 90]` or not a finite number.
    #[error("Latitude {0} is out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude is outside `[-180, 180]` or not a finite number.
    #[error("Longitude {0} is out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// Timestamp is before the Unix epoch.
    #[error("Timestamp {0} ms is negative")]
    NegativeTimestamp(i64),

    /// A location request cadence is unusable.
    #[error("Invalid location request: {0}")]
    InvalidRequest(String),
}

/// Result type alias using lochist-types' [`ValidationError`].
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
