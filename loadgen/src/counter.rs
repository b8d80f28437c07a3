use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Requests completed so far, shared by every worker of a run.
#[derive(Clone, Default)]
pub struct RequestCounter {
    count: Arc<AtomicU64>,
}

impl RequestCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one completed request and returns the new total.
    #[inline]
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

/// Admission tickets for the request budget.
///
/// A worker claims a ticket before it issues a request, so at most `limit`
/// requests are ever started. A limit of `0` hands out tickets forever.
#[derive(Clone)]
pub struct RequestBudget {
    limit: u64,
    claimed: Arc<AtomicU64>,
}

impl RequestBudget {
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            claimed: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.limit == 0
    }

    /// Takes one ticket, or returns false when the budget is spent.
    pub fn try_claim(&self) -> bool {
        if self.is_unbounded() {
            return true;
        }
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |claimed| {
                (claimed < self.limit).then_some(claimed + 1)
            })
            .is_ok()
    }

    /// True once `completed` requests use up a bounded budget.
    #[inline]
    #[must_use]
    pub fn is_spent_by(&self, completed: u64) -> bool {
        self.limit > 0 && completed >= self.limit
    }
}
