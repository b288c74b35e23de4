use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::warn;

/// Tracks completion of the batches belonging to one logical sync.
///
/// Batches are numbered from 1. Reporting the same batch twice (a retried
/// delivery that succeeded again) is harmless, so `completed_count()` counts
/// distinct batches, not callbacks.
#[derive(Debug)]
pub struct BatchTaskCounter {
    batches: Vec<AtomicBool>,
    completion_claimed: AtomicBool,
}

impl BatchTaskCounter {
    pub fn new(total: usize) -> Self {
        Self {
            batches: (0..total).map(|_| AtomicBool::new(false)).collect(),
            completion_claimed: AtomicBool::new(false),
        }
    }

    pub fn total(&self) -> usize {
        self.batches.len()
    }

    /// Marks batch `batch` (1-based) as delivered.
    pub fn batch_success(
        &self,
        batch: usize,
    ) {
        match batch.checked_sub(1).and_then(|idx| self.batches.get(idx)) {
            Some(flag) => flag.store(true, Ordering::SeqCst),
            None => warn!(batch, total = self.total(), "batch index out of range"),
        }
    }

    pub fn completed_count(&self) -> usize {
        self.batches
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }

    pub fn batch_completed(&self) -> bool {
        self.batches.iter().all(|flag| flag.load(Ordering::SeqCst))
    }

    /// Returns `true` exactly once, to the first caller that observes the
    /// counter completed.
    pub fn try_claim_completion(&self) -> bool {
        self.batch_completed()
            && self
                .completion_claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}
