//! Concurrent HTTP load generation.
//!
//! A [`LoadTest`] spawns `concurrency` workers that share a [`ClientPool`] of as
//! many clients. Each worker repeatedly takes a client, issues one request,
//! gives the client back and counts the attempt, until the request budget is
//! spent or the run is cancelled.

pub mod config;
pub mod coordinator;
pub mod counter;
pub mod error;
pub mod logging;
pub mod pool;
pub mod requester;
pub mod statistics;
mod worker;

pub use config::{LoadTestConfig, DEFAULT_CONCURRENCY};
pub use coordinator::LoadTest;
pub use counter::{RequestBudget, RequestCounter};
pub use error::LoadTestError;
pub use pool::{ClientLease, ClientPool, PoolError, PoolOccupancy};
pub use requester::{ClientFactory, HttpClientFactory, HttpRequester, Requester};
pub use statistics::{RequestStatistics, RunSummary};
pub use worker::{StopReason, WorkerReport};
