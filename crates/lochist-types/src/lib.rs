//! Shared types for the lochist location-history tracker.
//!
//! This crate holds the data model used by the store, the provider
//! abstraction and the service:
//!
//! - [`LocationRecord`] and [`CandidateRecord`] for persisted and pending samples
//! - [`RawUpdate`] as delivered by a location provider
//! - [`SubscriptionState`], [`LocationRequest`] and [`Availability`] for the
//!   subscription lifecycle
//!
//! # Example
//!
//! ```
//! use lochist_types::{CandidateRecord, RawUpdate};
//!
//! let update = RawUpdate {
//!     latitude: 35.0116,
//!     longitude: 135.768,
//!     timestamp_millis: 1_714_521_600_000,
//!     is_synthetic: true,
//! };
//! let candidate: CandidateRecord = update.to_candidate().unwrap();
//! assert_eq!(candidate.captured_at_millis, 1_714_521_600_000);
//! ```

pub mod error;
pub mod request;
pub mod types;

pub use error::{ValidationError, ValidationResult};
pub use request::{Availability, LocationRequest, Priority, ResolutionAction};
pub use types::{
    CandidateRecord, LocationRecord, RawUpdate, SubscriptionState, millis_to_datetime,
    validate_sample,
};
