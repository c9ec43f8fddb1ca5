//! Core types for location samples.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// Smallest valid latitude in degrees.
pub const MIN_LATITUDE: f64 = -90.0;
/// Largest valid latitude in degrees.
pub const MAX_LATITUDE: f64 = 90.0;
/// Smallest valid longitude in degrees.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Largest valid longitude in degrees.
pub const MAX_LONGITUDE: f64 = 180.0;

/// Check that a latitude/longitude pair and a timestamp are storable.
///
/// NaN and infinities are rejected along with out-of-range values.
pub fn validate_sample(latitude: f64, longitude: f64, captured_at_millis: i64) -> ValidationResult<()> {
    if !latitude.is_finite() || !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        return Err(ValidationError::LatitudeOutOfRange(latitude));
    }
    if !longitude.is_finite() || !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        return Err(ValidationError::LongitudeOutOfRange(longitude));
    }
    if captured_at_millis < 0 {
        return Err(ValidationError::NegativeTimestamp(captured_at_millis));
    }
    Ok(())
}

/// Convert epoch milliseconds into an [`OffsetDateTime`](time::OffsetDateTime) in UTC.
///
/// Returns `None` if the value is outside the range `time` can represent.
pub fn millis_to_datetime(millis: i64) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

/// A persisted location sample.
///
/// Records are created by the storage layer when a candidate is inserted and
/// are never mutated afterwards. The `id` is unique and increases with every
/// insert; `captured_at_millis` is event time and may repeat or arrive out of
/// order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationRecord {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
    /// When the fix was taken, in Unix epoch milliseconds.
    pub captured_at_millis: i64,
}

impl LocationRecord {
    /// When the fix was taken, as a UTC timestamp.
    #[must_use]
    pub fn captured_at(&self) -> Option<time::OffsetDateTime> {
        millis_to_datetime(self.captured_at_millis)
    }

    /// The candidate this record was stored from.
    #[must_use]
    pub fn to_candidate(&self) -> CandidateRecord {
        CandidateRecord {
            latitude: self.latitude,
            longitude: self.longitude,
            captured_at_millis: self.captured_at_millis,
        }
    }
}

impl fmt::Display for LocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} ({:.6}, {:.6}) @ {}",
            self.id, self.latitude, self.longitude, self.captured_at_millis
        )
    }
}

/// A location sample waiting for the store to assign it an id.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CandidateRecord {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// When the fix was taken, in Unix epoch milliseconds.
    pub captured_at_millis: i64,
}

impl CandidateRecord {
    /// Create a validated candidate.
    ///
    /// # Examples
    ///
    /// ```
    /// use lochist_types::CandidateRecord;
    ///
    /// assert!(CandidateRecord::new(35.0, 135.0, 1_000).is_ok());
    /// assert!(CandidateRecord::new(91.0, 135.0, 1_000).is_err());
    /// assert!(CandidateRecord::new(35.0, f64::NAN, 1_000).is_err());
    /// ```
    pub fn new(latitude: f64, longitude: f64, captured_at_millis: i64) -> ValidationResult<Self> {
        validate_sample(latitude, longitude, captured_at_millis)?;
        Ok(Self {
            latitude,
            longitude,
            captured_at_millis,
        })
    }

    /// Re-check a candidate built with a struct literal.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_sample(self.latitude, self.longitude, self.captured_at_millis)
    }
}

/// A raw position fix as delivered by a location provider.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawUpdate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Fix time in Unix epoch milliseconds.
    pub timestamp_millis: i64,
    /// True when the fix came from a mock or test source rather than a sensor.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_synthetic: bool,
}

impl RawUpdate {
    /// Convert into a storable candidate, validating coordinates.
    pub fn to_candidate(&self) -> ValidationResult<CandidateRecord> {
        CandidateRecord::new(self.latitude, self.longitude, self.timestamp_millis)
    }
}

/// Whether location updates are meant to be flowing.
///
/// Persisted outside the process so the intent survives restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubscriptionState {
    /// True after `start`, false after `stop` (and initially).
    pub is_active: bool,
}

impl SubscriptionState {
    /// The initial, inactive state.
    pub const INACTIVE: Self = Self { is_active: false };
    /// The active state.
    pub const ACTIVE: Self = Self { is_active: true };
}

impl From<bool> for SubscriptionState {
    fn from(is_active: bool) -> Self {
        Self { is_active }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_active {
            write!(f, "ACTIVE")
        } else {
            write!(f, "INACTIVE")
        }
    }
}
