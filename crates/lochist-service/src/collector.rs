//! Background collector draining the provider delivery channel.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lochist_core::UpdateReceiver;
use lochist_types::RawUpdate;

use crate::ingest::ingest;
use crate::state::AppState;

/// Consumes delivered batches and ingests each on the blocking pool.
///
/// Batches are processed independently, so several may be in flight at
/// once. Stopping the location subscription does not affect batches that
/// were already delivered.
pub struct Collector {
    state: Arc<AppState>,
    receiver: UpdateReceiver,
    cancel_token: CancellationToken,
}

impl Collector {
    /// Create a collector reading from `receiver`.
    pub fn new(state: Arc<AppState>, receiver: UpdateReceiver) -> Self {
        Self {
            state,
            receiver,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops the collector when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Run the collector in a background task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drain the channel until it closes or the token is cancelled.
    ///
    /// On cancellation the channel is closed to new batches. Batches still
    /// queued in it are ingested, and every batch on the blocking pool is
    /// awaited before this returns.
    pub async fn run(mut self) {
        info!("Collector started");
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Collector cancelled");
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Ingest task failed: {}", e);
                    }
                }
                batch = self.receiver.recv() => match batch {
                    Some(batch) => dispatch(&self.state, &mut in_flight, batch),
                    None => {
                        debug!("Delivery channel closed");
                        break;
                    }
                },
            }
        }

        // Batches already delivered are ingested, not discarded
        self.receiver.close();
        let mut queued = 0;
        while let Some(batch) = self.receiver.recv().await {
            dispatch(&self.state, &mut in_flight, batch);
            queued += 1;
        }
        if queued > 0 {
            info!("Ingesting {} batches queued before shutdown", queued);
        }

        if !in_flight.is_empty() {
            debug!("Waiting for {} in-flight batches", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Ingest task failed: {}", e);
            }
        }
        info!("Collector stopped");
    }
}

fn dispatch(state: &Arc<AppState>, in_flight: &mut JoinSet<()>, batch: Vec<RawUpdate>) {
    let state = Arc::clone(state);
    in_flight.spawn_blocking(move || ingest_batch(&state, &batch));
}

fn ingest_batch(state: &AppState, batch: &[RawUpdate]) {
    let result = ingest(&state.store, batch);
    if let Err(e) = &result {
        warn!("Batch of {} fixes not stored: {}", batch.len(), e);
    }
    state.ingest.record(&result);
}
