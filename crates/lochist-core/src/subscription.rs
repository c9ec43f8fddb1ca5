//! Subscription lifecycle.
//!
//! [`SubscriptionController`] turns location updates on and off and keeps
//! the user's intent in a [`FlagStore`] so it can be restored after a
//! restart. The state machine has two states, `INACTIVE` (initial) and
//! `ACTIVE`, and only [`start`](SubscriptionController::start) and
//! [`stop`](SubscriptionController::stop) move between them.

use std::sync::Arc;

use tracing::{debug, info, warn};

use lochist_types::{Availability, LocationRequest, SubscriptionState};

use crate::error::Result;
use crate::flags::FlagStore;
use crate::provider::{LocationProvider, SubscriptionHandle, UpdateSink};

/// Flag key holding the persisted subscription intent.
pub const REQUESTING_FLAG: &str = "location_requesting";

/// Starts and stops provider subscriptions and persists the intent.
pub struct SubscriptionController {
    provider: Arc<dyn LocationProvider>,
    flags: Arc<dyn FlagStore>,
    sink: UpdateSink,
    handle: Option<SubscriptionHandle>,
}

impl std::fmt::Debug for SubscriptionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionController")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl SubscriptionController {
    /// Create a controller delivering into `sink`.
    ///
    /// Nothing is subscribed until [`start`](Self::start) is called.
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        flags: Arc<dyn FlagStore>,
        sink: UpdateSink,
    ) -> Self {
        Self {
            provider,
            flags,
            sink,
            handle: None,
        }
    }

    /// Ask the provider whether `request` can be served.
    pub async fn check_availability(&self, request: &LocationRequest) -> Availability {
        let availability = self.provider.check_availability(request).await;
        debug!("Provider availability: {:?}", availability);
        availability
    }

    /// Subscribe with `request` and persist the active state.
    ///
    /// Calling `start` while already subscribed releases the current
    /// subscription and re-issues the request. If the provider fails, the
    /// persisted flag is left as it was. If the flag cannot be written, the
    /// new subscription is released again before the error is returned.
    pub async fn start(&mut self, request: &LocationRequest) -> Result<SubscriptionState> {
        request.validate()?;

        if let Some(previous) = self.handle.take() {
            debug!("Re-issuing subscription, releasing {}", previous);
            if let Err(e) = self.provider.unsubscribe(previous).await {
                self.handle = Some(previous);
                return Err(e);
            }
        }

        let handle = match self.provider.subscribe(request, self.sink.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to start location updates: {}", e);
                return Err(e);
            }
        };
        self.handle = Some(handle);

        if let Err(e) = self.flags.set_bool(REQUESTING_FLAG, true) {
            warn!("Failed to persist active state, releasing {}: {}", handle, e);
            match self.provider.unsubscribe(handle).await {
                Ok(()) => self.handle = None,
                Err(unsub) => warn!("Failed to release {}: {}", handle, unsub),
            }
            return Err(e.into());
        }
        info!(
            "Location updates started ({}, every {:?})",
            handle, request.interval
        );
        Ok(SubscriptionState::ACTIVE)
    }

    /// Release the current subscription and persist the inactive state.
    ///
    /// Stopping when nothing is subscribed only rewrites the flag.
    pub async fn stop(&mut self) -> Result<SubscriptionState> {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.provider.unsubscribe(handle).await {
                warn!("Failed to stop location updates: {}", e);
                self.handle = Some(handle);
                return Err(e);
            }
            info!("Location updates stopped ({})", handle);
        } else {
            debug!("Stop requested with no live subscription");
        }

        self.flags.set_bool(REQUESTING_FLAG, false)?;
        Ok(SubscriptionState::INACTIVE)
    }

    /// Read the persisted state after a restart.
    ///
    /// This does not subscribe. The caller re-checks availability and calls
    /// [`start`](Self::start) when the state is active.
    pub fn restore_on_init(&self) -> Result<SubscriptionState> {
        let state = self.state()?;
        info!("Restored subscription state: {}", state);
        Ok(state)
    }

    /// The persisted state.
    pub fn state(&self) -> Result<SubscriptionState> {
        Ok(self.flags.get_bool(REQUESTING_FLAG, false)?.into())
    }

    /// Whether a provider subscription is held by this controller.
    pub fn is_subscribed(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lochist_types::{Priority, RawUpdate};

    use super::*;
    use crate::error::Error;
    use crate::flags::{FlagStoreError, MemoryFlagStore};
    use crate::mock::MockProvider;
    use crate::provider::update_channel;

    struct Fixture {
        provider: Arc<MockProvider>,
        flags: Arc<MemoryFlagStore>,
        controller: SubscriptionController,
        rx: crate::provider::UpdateReceiver,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(MockProvider::default().without_emitter());
        let flags = Arc::new(MemoryFlagStore::new());
        let (sink, rx) = update_channel(8);
        let controller = SubscriptionController::new(provider.clone(), flags.clone(), sink);
        Fixture {
            provider,
            flags,
            controller,
            rx,
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_inactive() {
        let f = fixture();
        assert_eq!(f.controller.state().unwrap(), SubscriptionState::INACTIVE);
        assert!(!f.controller.is_subscribed());
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let mut f = fixture();
        let request = LocationRequest::default();

        assert_eq!(f.controller.start(&request).await.unwrap(), SubscriptionState::ACTIVE);
        assert!(f.flags.get_bool(REQUESTING_FLAG, false).unwrap());
        assert_eq!(f.provider.active_subscriptions().await, 1);

        f.provider
            .deliver(vec![RawUpdate {
                latitude: 35.0,
                longitude: 135.0,
                timestamp_millis: 1,
                is_synthetic: true,
            }])
            .await;
        assert_eq!(f.rx.recv().await.unwrap().len(), 1);

        assert_eq!(f.controller.stop().await.unwrap(), SubscriptionState::INACTIVE);
        assert!(!f.flags.get_bool(REQUESTING_FLAG, true).unwrap());
        assert_eq!(f.provider.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_start_twice_reissues() {
        let mut f = fixture();
        let request = LocationRequest::default();

        f.controller.start(&request).await.unwrap();
        f.controller.start(&request).await.unwrap();

        assert_eq!(f.controller.state().unwrap(), SubscriptionState::ACTIVE);
        assert_eq!(f.provider.subscribe_count(), 2);
        assert_eq!(f.provider.active_subscriptions().await, 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut f = fixture();
        assert_eq!(f.controller.stop().await.unwrap(), SubscriptionState::INACTIVE);
        assert_eq!(f.controller.stop().await.unwrap(), SubscriptionState::INACTIVE);
        assert_eq!(f.controller.state().unwrap(), SubscriptionState::INACTIVE);
    }

    #[tokio::test]
    async fn test_state_survives_new_controller() {
        let mut f = fixture();
        f.controller.start(&LocationRequest::default()).await.unwrap();
        drop(f.controller);

        let (sink, _rx) = update_channel(8);
        let restored = SubscriptionController::new(f.provider.clone(), f.flags.clone(), sink);
        assert_eq!(restored.restore_on_init().unwrap(), SubscriptionState::ACTIVE);
        // Restoring never subscribes on its own
        assert!(!restored.is_subscribed());
        assert_eq!(f.provider.subscribe_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_flag_untouched() {
        let mut f = fixture();
        f.provider.set_should_fail(true, Some("permission denied")).await;

        let err = f.controller.start(&LocationRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(f.controller.state().unwrap(), SubscriptionState::INACTIVE);
        assert!(!f.controller.is_subscribed());
    }

    struct ReadOnlyFlags;

    impl FlagStore for ReadOnlyFlags {
        fn get_bool(&self, _key: &str, default: bool) -> std::result::Result<bool, FlagStoreError> {
            Ok(default)
        }

        fn set_bool(&self, _key: &str, _value: bool) -> std::result::Result<(), FlagStoreError> {
            Err(FlagStoreError::Io {
                path: "flags.toml".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }
    }

    #[tokio::test]
    async fn test_flag_write_failure_releases_subscription() {
        let provider = Arc::new(MockProvider::default().without_emitter());
        let (sink, _rx) = update_channel(8);
        let mut controller =
            SubscriptionController::new(provider.clone(), Arc::new(ReadOnlyFlags), sink);

        let err = controller.start(&LocationRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Flags(FlagStoreError::Io { .. })));
        assert!(!controller.is_subscribed());
        assert_eq!(provider.active_subscriptions().await, 0);
        assert_eq!(controller.state().unwrap(), SubscriptionState::INACTIVE);
    }

    #[tokio::test]
    async fn test_failed_stop_keeps_subscription() {
        let mut f = fixture();
        f.controller.start(&LocationRequest::default()).await.unwrap();

        f.provider.set_transient_failures(1);
        assert!(f.controller.stop().await.is_err());
        assert!(f.controller.is_subscribed());
        assert_eq!(f.controller.state().unwrap(), SubscriptionState::ACTIVE);

        f.controller.stop().await.unwrap();
        assert!(!f.controller.is_subscribed());
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let mut f = fixture();
        let request = LocationRequest::new(
            Duration::from_secs(10),
            Duration::from_secs(60),
            Priority::HighAccuracy,
        );

        let err = f.controller.start(&request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(f.provider.subscribe_count(), 0);
    }

    #[tokio::test]
    async fn test_check_availability_delegates() {
        let f = fixture();
        let request = LocationRequest::default();
        assert!(f.controller.check_availability(&request).await.is_available());

        f.provider
            .set_availability(Availability::TerminalFailure("no GPS".into()))
            .await;
        assert!(!f.controller.check_availability(&request).await.is_available());
    }
}
