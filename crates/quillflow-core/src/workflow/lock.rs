//! Per-envelope lock table.
//!
//! Every mutating workflow operation holds the lock for its envelope from
//! the status read until the new state is committed, so two operations on
//! the same envelope never interleave. Different envelopes never contend.
//! Draft edits and workflow transitions share one table.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use quillflow_types::config::WorkflowSettings;
use quillflow_types::envelope::EnvelopeId;
use quillflow_types::error::EnvelopeError;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while an envelope is being mutated. Dropping it releases the lock.
pub type EnvelopeGuard = OwnedMutexGuard<()>;

/// Lazily populated map of envelope id to async mutex.
#[derive(Debug)]
pub struct EnvelopeLocks {
    locks: DashMap<EnvelopeId, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl Default for EnvelopeLocks {
    fn default() -> Self {
        Self::new(Duration::from_millis(
            WorkflowSettings::default().lock_timeout_ms,
        ))
    }
}

impl EnvelopeLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Wait up to the configured timeout for the envelope's lock.
    pub async fn acquire(&self, id: EnvelopeId) -> Result<EnvelopeGuard, EnvelopeError> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(envelope_id = %id, timeout_ms = self.timeout.as_millis() as u64, "Envelope lock wait timed out");
                EnvelopeError::Concurrency(format!(
                    "envelope {id} is busy with another operation"
                ))
            })
    }

    /// Drop entries that nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
