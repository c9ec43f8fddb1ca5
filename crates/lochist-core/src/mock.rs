//! Mock location provider for testing and demos.
//!
//! [`MockProvider`] implements [`LocationProvider`] without any platform
//! location service behind it.
//!
//! # Features
//!
//! - **Availability control**: report any [`Availability`] outcome
//! - **Failure injection**: fail subscribe/unsubscribe always or a set number of times
//! - **Manual delivery**: push a batch to every live subscription with [`MockProvider::deliver`]
//! - **Emitter**: a background random walk around an origin, one fix per interval

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lochist_types::types::{MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE};
use lochist_types::{Availability, LocationRequest, RawUpdate};

use crate::error::{Error, Result};
use crate::provider::{LocationProvider, SubscriptionHandle, UpdateSink};

/// Largest per-fix step of the random walk, in degrees (roughly 50 m).
const WALK_STEP_DEGREES: f64 = 0.0005;

struct ActiveSubscription {
    sink: UpdateSink,
    cancel: CancellationToken,
}

/// A mock location provider.
///
/// # Example
///
/// ```
/// use lochist_core::{LocationProvider, MockProvider, update_channel};
/// use lochist_types::{LocationRequest, RawUpdate};
///
/// #[tokio::main]
/// async fn main() {
///     let provider = MockProvider::new(35.0116, 135.768).without_emitter();
///     let (sink, mut rx) = update_channel(4);
///     provider.subscribe(&LocationRequest::default(), sink).await.unwrap();
///
///     provider.deliver(vec![RawUpdate {
///         latitude: 35.0,
///         longitude: 135.0,
///         timestamp_millis: 1_000,
///         is_synthetic: true,
///     }]).await;
///     assert_eq!(rx.recv().await.unwrap().len(), 1);
/// }
/// ```
pub struct MockProvider {
    origin: (f64, f64),
    emit: bool,
    availability: RwLock<Availability>,
    subscriptions: Mutex<HashMap<u64, ActiveSubscription>>,
    next_handle: AtomicU64,
    subscribe_count: AtomicU32,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Number of calls to fail before succeeding again.
    remaining_failures: AtomicU32,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("origin", &self.origin)
            .field("emit", &self.emit)
            .field("subscribe_count", &self.subscribe_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockProvider {
    /// Centered on Kyoto.
    fn default() -> Self {
        Self::new(35.0116, 135.768)
    }
}

impl MockProvider {
    /// Create a provider whose emitter walks around `(latitude, longitude)`.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            origin: (latitude, longitude),
            emit: true,
            availability: RwLock::new(Availability::Available),
            subscriptions: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            subscribe_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            remaining_failures: AtomicU32::new(0),
        }
    }

    /// Disable the background emitter; fixes then only arrive via [`deliver`](Self::deliver).
    #[must_use]
    pub fn without_emitter(mut self) -> Self {
        self.emit = false;
        self
    }

    /// The walk origin.
    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    // --- Test control methods ---

    /// Set what [`LocationProvider::check_availability`] reports.
    pub async fn set_availability(&self, availability: Availability) {
        *self.availability.write().await = availability;
    }

    /// Make subscribe and unsubscribe fail until cleared.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Fail the next `count` subscribe/unsubscribe calls, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Number of successful subscribe calls so far.
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::Relaxed)
    }

    /// Number of subscriptions currently held.
    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Push a batch to every live subscription.
    ///
    /// Returns how many sinks accepted it. Sinks whose receiver is gone are
    /// skipped.
    pub async fn deliver(&self, batch: Vec<RawUpdate>) -> usize {
        let sinks: Vec<UpdateSink> = self
            .subscriptions
            .lock()
            .await
            .values()
            .map(|sub| sub.sink.clone())
            .collect();

        let mut delivered = 0;
        for sink in sinks {
            if sink.send(batch.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        debug!("Delivered batch of {} fixes to {} sinks", batch.len(), delivered);
        delivered
    }

    async fn check_should_fail(&self) -> Result<()> {
        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::Provider(self.fail_message.read().await.clone()));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            Err(Error::Provider(self.fail_message.read().await.clone()))
        } else {
            Ok(())
        }
    }

    fn spawn_emitter(&self, request: &LocationRequest, sink: UpdateSink, cancel: CancellationToken) {
        let period = request.interval;
        let mut position = self.origin;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Mock emitter cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        position = step(position);
                        let fix = RawUpdate {
                            latitude: position.0,
                            longitude: position.1,
                            timestamp_millis: now_millis(),
                            is_synthetic: true,
                        };
                        if sink.send(vec![fix]).await.is_err() {
                            debug!("Mock emitter sink closed, stopping");
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// One random-walk step, kept inside valid coordinate ranges.
fn step((latitude, longitude): (f64, f64)) -> (f64, f64) {
    let dlat = rand::random_range(-WALK_STEP_DEGREES..=WALK_STEP_DEGREES);
    let dlon = rand::random_range(-WALK_STEP_DEGREES..=WALK_STEP_DEGREES);
    (
        (latitude + dlat).clamp(MIN_LATITUDE, MAX_LATITUDE),
        (longitude + dlon).clamp(MIN_LONGITUDE, MAX_LONGITUDE),
    )
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[async_trait]
impl LocationProvider for MockProvider {
    async fn check_availability(&self, _request: &LocationRequest) -> Availability {
        self.availability.read().await.clone()
    }

    async fn subscribe(
        &self,
        request: &LocationRequest,
        sink: UpdateSink,
    ) -> Result<SubscriptionHandle> {
        request.validate()?;
        self.check_should_fail().await?;

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        if self.emit {
            self.spawn_emitter(request, sink.clone(), cancel.clone());
        }

        self.subscriptions
            .lock()
            .await
            .insert(id, ActiveSubscription { sink, cancel });
        self.subscribe_count.fetch_add(1, Ordering::Relaxed);

        let handle = SubscriptionHandle(id);
        info!(
            "Mock subscription {} started ({:?} interval, {})",
            handle, request.interval, request.priority
        );
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.check_should_fail().await?;

        match self.subscriptions.lock().await.remove(&handle.0) {
            Some(sub) => {
                sub.cancel.cancel();
                info!("Mock subscription {} stopped", handle);
            }
            None => debug!("Unsubscribe for unknown handle {}", handle),
        }
        Ok(())
    }
}
