//! Location provider abstraction.
//!
//! A [`LocationProvider`] is whatever produces position fixes: a platform
//! location service, a GPS daemon, or the [`MockProvider`](crate::MockProvider)
//! used in tests and demos. Fixes are pushed in batches into the
//! [`UpdateSink`] handed over at subscribe time.

use core::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use lochist_types::{Availability, LocationRequest, RawUpdate};

use crate::error::Result;

/// Channel end a provider delivers batches of fixes into.
pub type UpdateSink = mpsc::Sender<Vec<RawUpdate>>;

/// Receiving end paired with an [`UpdateSink`].
pub type UpdateReceiver = mpsc::Receiver<Vec<RawUpdate>>;

/// Create a sink/receiver pair holding up to `capacity` pending batches.
pub fn update_channel(capacity: usize) -> (UpdateSink, UpdateReceiver) {
    mpsc::channel(capacity)
}

/// Opaque token identifying one active provider subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Source of location fixes.
///
/// # Example
///
/// ```ignore
/// use lochist_core::{LocationProvider, update_channel};
/// use lochist_types::LocationRequest;
///
/// async fn follow<P: LocationProvider>(provider: &P) -> lochist_core::Result<()> {
///     let request = LocationRequest::default();
///     if provider.check_availability(&request).await.is_available() {
///         let (sink, mut rx) = update_channel(16);
///         let handle = provider.subscribe(&request, sink).await?;
///         while let Some(batch) = rx.recv().await {
///             println!("{} fixes", batch.len());
///         }
///         provider.unsubscribe(handle).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Whether the provider can serve `request` right now.
    async fn check_availability(&self, request: &LocationRequest) -> Availability;

    /// Begin delivering fixes into `sink` at the cadence in `request`.
    async fn subscribe(&self, request: &LocationRequest, sink: UpdateSink)
    -> Result<SubscriptionHandle>;

    /// Stop the subscription identified by `handle`.
    ///
    /// Unknown handles are not an error.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}
