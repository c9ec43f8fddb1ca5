//! Location request parameters and provider availability.

use core::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// Default interval between updates (5 minutes).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
/// Default fastest interval the consumer accepts (1 minute).
pub const DEFAULT_FASTEST_INTERVAL: Duration = Duration::from_secs(60);

/// Power/accuracy trade-off requested from the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum Priority {
    /// Most accurate fixes, highest power draw.
    HighAccuracy,
    /// Block-level accuracy.
    #[default]
    BalancedPowerAccuracy,
    /// City-level accuracy.
    LowPower,
    /// Only fixes other consumers already requested.
    Passive,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::HighAccuracy => write!(f, "high accuracy"),
            Priority::BalancedPowerAccuracy => write!(f, "balanced power/accuracy"),
            Priority::LowPower => write!(f, "low power"),
            Priority::Passive => write!(f, "passive"),
        }
    }
}

/// Cadence and priority for a location subscription.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lochist_types::{LocationRequest, Priority};
///
/// let request = LocationRequest::default();
/// assert_eq!(request.interval, Duration::from_secs(300));
/// assert_eq!(request.fastest_interval, Duration::from_secs(60));
/// assert_eq!(request.priority, Priority::BalancedPowerAccuracy);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequest {
    /// Desired interval between updates.
    pub interval: Duration,
    /// Fastest rate at which updates may be delivered.
    pub fastest_interval: Duration,
    /// Power/accuracy trade-off.
    pub priority: Priority,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            fastest_interval: DEFAULT_FASTEST_INTERVAL,
            priority: Priority::default(),
        }
    }
}

impl LocationRequest {
    /// Create a request with the given cadence.
    pub fn new(interval: Duration, fastest_interval: Duration, priority: Priority) -> Self {
        Self {
            interval,
            fastest_interval,
            priority,
        }
    }

    /// Reject cadences a provider cannot honor.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.interval.is_zero() {
            return Err(ValidationError::InvalidRequest(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.fastest_interval.is_zero() {
            return Err(ValidationError::InvalidRequest(
                "fastest interval must be greater than zero".to_string(),
            ));
        }
        if self.fastest_interval > self.interval {
            return Err(ValidationError::InvalidRequest(format!(
                "fastest interval {:?} exceeds interval {:?}",
                self.fastest_interval, self.interval
            )));
        }
        Ok(())
    }
}

/// Something the user can do to make location available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResolutionAction {
    /// Device location settings must be changed (e.g. location services off).
    ChangeLocationSettings,
    /// The app lacks location permission.
    GrantPermission,
}

/// Outcome of asking a provider whether it can serve a request.
///
/// The UI layer branches on this; the ingestion pipeline never sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", content = "detail", rename_all = "snake_case"))]
pub enum Availability {
    /// Updates can be requested right away.
    Available,
    /// Not available now, but the user can fix it.
    ResolvableFailure(ResolutionAction),
    /// Not available and nothing the user can do about it.
    TerminalFailure(String),
}

impl Availability {
    /// True for [`Availability::Available`].
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}
