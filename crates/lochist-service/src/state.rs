//! Application state shared across handlers.
//!
//! # Lock Ordering
//!
//! When both are needed, take `config` before `subscription`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use lochist_core::{SubscriptionController, UpdateSink};
use lochist_store::Store;

use crate::config::Config;
use crate::ingest::{IngestError, IngestOutcome};

/// Shared application state.
pub struct AppState {
    /// The location store. Internally synchronized.
    pub store: Arc<Store>,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// Subscription lifecycle; one start/stop at a time.
    pub subscription: Mutex<SubscriptionController>,
    /// Delivery channel into the collector.
    pub updates: UpdateSink,
    /// Ingestion counters.
    pub ingest: IngestStats,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        store: Arc<Store>,
        config: Config,
        subscription: SubscriptionController,
        updates: UpdateSink,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            config: RwLock::new(config),
            subscription: Mutex::new(subscription),
            updates,
            ingest: IngestStats::new(),
        })
    }
}

/// Running totals over every ingested batch.
#[derive(Debug, Default)]
pub struct IngestStats {
    batches: AtomicU64,
    received: AtomicU64,
    accepted: AtomicU64,
    dropped_real: AtomicU64,
    invalid: AtomicU64,
    failures: AtomicU64,
    /// Unix timestamp (seconds) of the last successful batch, 0 if none.
    last_ingest_at: AtomicU64,
    /// Unix timestamp (seconds) of the last failed batch, 0 if none.
    last_error_at: AtomicU64,
    last_error: std::sync::Mutex<Option<String>>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch result into the totals.
    pub fn record(&self, result: &Result<IngestOutcome, IngestError>) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        let now = OffsetDateTime::now_utc().unix_timestamp() as u64;

        match result {
            Ok(outcome) => {
                self.received.fetch_add(outcome.received as u64, Ordering::Relaxed);
                self.accepted.fetch_add(outcome.accepted as u64, Ordering::Relaxed);
                self.dropped_real
                    .fetch_add(outcome.dropped_real as u64, Ordering::Relaxed);
                self.invalid.fetch_add(outcome.invalid as u64, Ordering::Relaxed);
                self.last_ingest_at.store(now, Ordering::Relaxed);
            }
            Err(e) => {
                self.received.fetch_add(e.attempted() as u64, Ordering::Relaxed);
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.last_error_at.store(now, Ordering::Relaxed);
                *self
                    .last_error
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(e.to_string());
            }
        }
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_real: self.dropped_real.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_ingest_at: timestamp(self.last_ingest_at.load(Ordering::Relaxed)),
            last_error_at: timestamp(self.last_error_at.load(Ordering::Relaxed)),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone(),
        }
    }
}

fn timestamp(secs: u64) -> Option<OffsetDateTime> {
    if secs == 0 {
        None
    } else {
        OffsetDateTime::from_unix_timestamp(secs as i64).ok()
    }
}

/// Serializable view of [`IngestStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub batches: u64,
    pub received: u64,
    pub accepted: u64,
    pub dropped_real: u64,
    pub invalid: u64,
    pub failures: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_ingest_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_start_empty() {
        let stats = IngestStats::new();
        assert_eq!(stats.snapshot(), IngestSnapshot::default());
    }

    #[test]
    fn test_stats_accumulate_outcomes() {
        let stats = IngestStats::new();
        stats.record(&Ok(IngestOutcome {
            received: 3,
            accepted: 2,
            dropped_real: 1,
            invalid: 0,
        }));
        stats.record(&Ok(IngestOutcome {
            received: 1,
            accepted: 0,
            dropped_real: 0,
            invalid: 1,
        }));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.batches, 2);
        assert_eq!(snapshot.received, 4);
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.dropped_real, 1);
        assert_eq!(snapshot.invalid, 1);
        assert_eq!(snapshot.failures, 0);
        assert!(snapshot.last_ingest_at.is_some());
        assert!(snapshot.last_error.is_none());
    }

    #[test]
    fn test_stats_record_failures() {
        let stats = IngestStats::new();
        stats.record(&Err(IngestError::Store {
            attempted: 4,
            source: lochist_store::Error::SchemaMismatch("gone".into()),
        }));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.accepted, 0);
        assert!(snapshot.last_error_at.is_some());
        assert!(snapshot.last_error.unwrap().contains("0 of 4"));
    }

    #[test]
    fn test_snapshot_serialization() {
        let json = serde_json::to_value(IngestStats::new().snapshot()).unwrap();
        assert_eq!(json["batches"], 0);
        assert!(json["last_ingest_at"].is_null());
    }
}
