use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::Uri;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::counter::{RequestBudget, RequestCounter};
use crate::pool::ClientPool;
use crate::requester::Requester;
use crate::statistics::RequestStatistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BudgetExhausted,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub id: usize,
    pub stop_reason: StopReason,
    pub stats: RequestStatistics,
}

/// One concurrent stream of acquire, request, release, account cycles.
pub(crate) struct Worker<R> {
    id: usize,
    target: Uri,
    pool: Arc<ClientPool<R>>,
    counter: RequestCounter,
    budget: RequestBudget,
    cancel: CancellationToken,
}

impl<R: Requester> Worker<R> {
    pub(crate) fn new(
        id: usize,
        target: Uri,
        pool: Arc<ClientPool<R>>,
        counter: RequestCounter,
        budget: RequestBudget,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            target,
            pool,
            counter,
            budget,
            cancel,
        }
    }

    pub(crate) async fn run(self) -> WorkerReport {
        debug!(worker = self.id, "Worker started");
        let mut stats = RequestStatistics::default();
        let stop_reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if !self.budget.try_claim() {
                break StopReason::BudgetExhausted;
            }
            let mut client = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break StopReason::Cancelled,
                lease = self.pool.acquire() => match lease {
                    Ok(lease) => lease,
                    Err(e) => {
                        warn!(worker = self.id, error = %e, "Worker could not acquire a client");
                        break StopReason::Cancelled;
                    }
                },
            };
            let (rtt, outcome) = run_timed(client.request(&self.target)).await;
            client.release();

            self.counter.increment();
            stats.record(rtt, outcome.is_ok());
            if self.budget.is_spent_by(self.counter.snapshot()) {
                break StopReason::BudgetExhausted;
            }
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
        };
        debug!(
            worker = self.id,
            ?stop_reason,
            attempts = stats.attempts,
            failures = stats.failures,
            "Worker stopped"
        );
        WorkerReport {
            id: self.id,
            stop_reason,
            stats,
        }
    }
}

#[inline]
async fn run_timed<T, F: Future<Output = T>>(fut: F) -> (Duration, T) {
    let start = Instant::now();
    let res = fut.await;
    (start.elapsed(), res)
}
