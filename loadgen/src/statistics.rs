use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::worker::WorkerReport;

/// Outcome and round trip counts for a stream of requests.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestStatistics {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub min_rtt_us: u64,
    pub max_rtt_us: u64,
    pub total_rtt_us: u64,
}

impl RequestStatistics {
    pub fn record(&mut self, rtt: Duration, success: bool) {
        let cur = u64::try_from(rtt.as_micros()).unwrap_or(u64::MAX);
        if self.attempts == 0 || cur < self.min_rtt_us {
            self.min_rtt_us = cur;
        }
        if cur > self.max_rtt_us {
            self.max_rtt_us = cur;
        }
        self.total_rtt_us = self.total_rtt_us.saturating_add(cur);
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }

    pub fn merge(&mut self, other: &Self) {
        if other.attempts == 0 {
            return;
        }
        if self.attempts == 0 || other.min_rtt_us < self.min_rtt_us {
            self.min_rtt_us = other.min_rtt_us;
        }
        self.max_rtt_us = self.max_rtt_us.max(other.max_rtt_us);
        self.total_rtt_us = self.total_rtt_us.saturating_add(other.total_rtt_us);
        self.attempts += other.attempts;
        self.successes += other.successes;
        self.failures += other.failures;
    }

    #[inline]
    #[must_use]
    pub fn mean_rtt_us(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.total_rtt_us as f64 / self.attempts as f64
    }
}

/// What a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub target: String,
    pub concurrency: usize,
    pub request_budget: u64,
    /// Final value of the shared request counter.
    pub completed: u64,
    pub elapsed_ms: u64,
    pub requests_per_second: f64,
    /// Idle clients once every worker stopped.
    pub idle_clients: usize,
    pub totals: RequestStatistics,
    pub workers: Vec<WorkerReport>,
}

impl RunSummary {
    #[must_use]
    pub fn new(
        target: String,
        concurrency: usize,
        request_budget: u64,
        completed: u64,
        elapsed: Duration,
        idle_clients: usize,
        workers: Vec<WorkerReport>,
    ) -> Self {
        let mut totals = RequestStatistics::default();
        for w in &workers {
            totals.merge(&w.stats);
        }
        let secs = elapsed.as_secs_f64();
        let requests_per_second = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };
        Self {
            target,
            concurrency,
            request_budget,
            completed,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            requests_per_second,
            idle_clients,
            totals,
            workers,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.totals;
        write!(
            f,
            "\
Results for {} (concurrency {}, budget {}):
    requests            [total, ok, failed] = [{}, {}, {}]
    rtt my s            [min, mean, max]    = [{}, {:.2}, {}]
    elapsed ms          = {}
    throughput req/s    = {:.2}",
            self.target,
            self.concurrency,
            self.request_budget,
            self.completed,
            t.successes,
            t.failures,
            t.min_rtt_us,
            t.mean_rtt_us(),
            t.max_rtt_us,
            self.elapsed_ms,
            self.requests_per_second,
        )
    }
}
