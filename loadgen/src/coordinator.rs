use std::sync::Arc;
use std::time::Instant;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::LoadTestConfig;
use crate::counter::{RequestBudget, RequestCounter};
use crate::error::LoadTestError;
use crate::pool::ClientPool;
use crate::requester::ClientFactory;
use crate::statistics::RunSummary;
use crate::worker::{Worker, WorkerReport};

/// Runs one load test: a client pool of `concurrency` clients shared by as many workers.
pub struct LoadTest<F> {
    config: LoadTestConfig,
    factory: F,
}

impl<F: ClientFactory> LoadTest<F> {
    #[must_use]
    pub fn new(config: LoadTestConfig, factory: F) -> Self {
        Self { config, factory }
    }

    /// Spawns the workers and waits for all of them to stop.
    ///
    /// Returns once the budget is spent or `cancel` fires. An unbounded run only
    /// ends through `cancel`. Configuration errors are reported before any client
    /// is created; request failures never fail the run.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary, LoadTestError> {
        let target = self.config.validate()?;
        let concurrency = self.config.concurrency;
        let request_budget = self.config.request_budget;
        info!(url = %target, concurrency, request_budget, "Running load test");
        if self.config.is_unbounded() {
            info!("No request budget, running until cancelled");
        }
        if let Some(rps) = self.config.requests_per_second {
            warn!(rps, "Requests per second is not enforced, workers run unthrottled");
        }

        let pool: Arc<ClientPool<F::Client>> = Arc::new(ClientPool::with_capacity(concurrency));
        let counter = RequestCounter::new();
        let budget = RequestBudget::new(request_budget);
        let workers_cancel = cancel.child_token();
        let started = Instant::now();

        let mut tasks: JoinSet<(usize, Result<WorkerReport, JoinError>)> = JoinSet::new();
        for id in 0..concurrency {
            if let Err(e) = pool.add_client(&self.factory, &target) {
                error!(slot = id, error = %format!("{e:#}"), "Failed to create client, aborting run");
                workers_cancel.cancel();
                pool.close();
                if let Err(panicked) = join_workers(tasks, &workers_cancel).await {
                    error!(error = %panicked, "Worker failed while the run was aborting");
                }
                return Err(LoadTestError::ClientConstruction {
                    slot: id,
                    source: e.into(),
                });
            }
            let worker = Worker::new(
                id,
                target.clone(),
                Arc::clone(&pool),
                counter.clone(),
                budget.clone(),
                workers_cancel.clone(),
            );
            // The outer task only awaits the worker, so a worker panic still carries its id.
            let handle = tokio::spawn(worker.run());
            tasks.spawn(async move { (id, handle.await) });
        }

        let mut workers = join_workers(tasks, &workers_cancel).await?;
        workers.sort_by_key(|w| w.id);
        let occupancy = pool.occupancy();
        let summary = RunSummary::new(
            target.to_string(),
            concurrency,
            request_budget,
            counter.snapshot(),
            started.elapsed(),
            occupancy.idle,
            workers,
        );
        info!(
            completed = summary.completed,
            failures = summary.totals.failures,
            elapsed_ms = summary.elapsed_ms,
            "Load test finished"
        );
        Ok(summary)
    }
}

/// Joins workers as they finish. The first panic cancels the rest and is returned
/// once every worker has stopped.
async fn join_workers(
    mut tasks: JoinSet<(usize, Result<WorkerReport, JoinError>)>,
    cancel: &CancellationToken,
) -> Result<Vec<WorkerReport>, LoadTestError> {
    let mut reports = Vec::with_capacity(tasks.len());
    let mut failed = None;
    while let Some(joined) = tasks.join_next().await {
        let (worker, result) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                error!(error = %e, "Worker join task failed");
                cancel.cancel();
                continue;
            }
        };
        match result {
            Ok(report) => reports.push(report),
            Err(source) => {
                error!(worker, error = %source, "Worker terminated abnormally");
                cancel.cancel();
                if failed.is_none() {
                    failed = Some(LoadTestError::WorkerPanicked { worker, source });
                }
            }
        }
    }
    match failed {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}
