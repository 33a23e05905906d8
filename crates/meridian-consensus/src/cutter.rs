//! Block cutter - per-channel batching policy
//!
//! Groups ordered transactions into candidate blocks. The policy here is
//! count-based: a batch is cut as soon as it reaches `max_message_count`.
//! The limit is supplied on every [`Receiver::ordered`] call from the
//! channel's current configuration, so a committed batch-size change applies
//! to the very next transaction. Chains call [`Receiver::cut`] to flush
//! pending transactions before a config commit.

use meridian_core::Envelope;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Batching counters for one channel's cutter.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Batches cut because they reached the size limit
    pub full_batches: AtomicU64,
    /// Batches flushed by an explicit cut
    pub flushed_batches: AtomicU64,
}

impl Metrics {
    /// Create a fresh set of counters.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Batching policy seen by a chain.
pub trait Receiver: Send + Sync {
    /// Enqueue one transaction under the given batch limit. Returns the
    /// batches that became complete as a result, and whether transactions
    /// remain pending.
    fn ordered(&self, env: Envelope, max_message_count: u32) -> (Vec<Vec<Envelope>>, bool);

    /// Flush and return the pending batch; empty if nothing is pending.
    fn cut(&self) -> Vec<Envelope>;
}

/// Count-based [`Receiver`] honoring `BatchSize.max_message_count`.
pub struct BlockCutter {
    pending: Mutex<Vec<Envelope>>,
    metrics: Arc<Metrics>,
}

impl BlockCutter {
    /// Create a cutter with the given counters.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            metrics,
        }
    }
}

impl Receiver for BlockCutter {
    fn ordered(&self, env: Envelope, max_message_count: u32) -> (Vec<Vec<Envelope>>, bool) {
        let limit = (max_message_count as usize).max(1);
        let mut pending = self.pending.lock();
        pending.push(env);
        if pending.len() >= limit {
            self.metrics.full_batches.fetch_add(1, Ordering::Relaxed);
            return (vec![std::mem::take(&mut *pending)], false);
        }
        (Vec::new(), true)
    }

    fn cut(&self) -> Vec<Envelope> {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            self.metrics.flushed_batches.fetch_add(1, Ordering::Relaxed);
        }
        std::mem::take(&mut *pending)
    }
}
