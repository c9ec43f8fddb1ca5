//! Ingestion of provider batches into the store.
//!
//! [`ingest`] is stateless: it filters one delivered batch, validates what is
//! left and writes it with a single atomic [`Store::insert_batch`] call.
//!
//! Only fixes flagged `is_synthetic` are kept; real sensor fixes are counted
//! and dropped with a warning.

use serde::Serialize;
use tracing::{debug, warn};

use lochist_store::Store;
use lochist_types::{CandidateRecord, RawUpdate};

/// What happened to one delivered batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Fixes in the delivered batch.
    pub received: usize,
    /// Fixes written to the store.
    pub accepted: usize,
    /// Real (non-synthetic) fixes that were discarded.
    pub dropped_real: usize,
    /// Synthetic fixes discarded for invalid coordinates or timestamps.
    pub invalid: usize,
}

/// Ingestion failure. Nothing from the batch was stored.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to store batch, 0 of {attempted} fixes stored: {source}")]
    Store {
        attempted: usize,
        #[source]
        source: lochist_store::Error,
    },
}

impl IngestError {
    /// Number of fixes that were about to be written.
    pub fn attempted(&self) -> usize {
        match self {
            IngestError::Store { attempted, .. } => *attempted,
        }
    }
}

/// Filter, validate and store one batch of provider updates.
pub fn ingest(store: &Store, updates: &[RawUpdate]) -> Result<IngestOutcome, IngestError> {
    let mut outcome = IngestOutcome {
        received: updates.len(),
        ..Default::default()
    };

    let mut candidates: Vec<CandidateRecord> = Vec::with_capacity(updates.len());
    for update in updates {
        if !update.is_synthetic {
            outcome.dropped_real += 1;
            continue;
        }
        match update.to_candidate() {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                warn!("Dropping fix at {}: {}", update.timestamp_millis, e);
                outcome.invalid += 1;
            }
        }
    }

    if outcome.dropped_real > 0 {
        warn!(
            "Dropped {} real location fixes; only synthetic fixes are recorded",
            outcome.dropped_real
        );
    }

    if candidates.is_empty() {
        debug!("Nothing to store from batch of {}", outcome.received);
        return Ok(outcome);
    }

    let attempted = candidates.len();
    outcome.accepted = store
        .insert_batch(&candidates)
        .map_err(|source| IngestError::Store { attempted, source })?;

    debug!(
        "Ingested {} of {} fixes ({} real dropped, {} invalid)",
        outcome.accepted, outcome.received, outcome.dropped_real, outcome.invalid
    );
    Ok(outcome)
}
