//! Persistence circuit breaker.
//!
//! Trips after a run of consecutive items whose results could not be saved,
//! so the job stops paying providers for output it cannot keep.

use tracing::warn;

/// Action to take after recording an item result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerAction {
    Continue,
    /// Pause the job.
    Trip,
}

#[derive(Debug)]
pub struct PersistenceBreaker {
    threshold: u32,
    consecutive_failures: u32,
}

impl PersistenceBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    /// Record whether the item's persistence succeeded.
    ///
    /// Items that fail for other reasons count as success here: only
    /// consecutive persistence failures trip the breaker.
    pub fn record(&mut self, persistence_failed: bool) -> BreakerAction {
        if !persistence_failed {
            self.consecutive_failures = 0;
            return BreakerAction::Continue;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold {
            warn!(
                "{} consecutive persistence failures, tripping breaker",
                self.consecutive_failures
            );
            self.consecutive_failures = 0;
            BreakerAction::Trip
        } else {
            BreakerAction::Continue
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
