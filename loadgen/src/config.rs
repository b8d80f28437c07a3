use std::time::Duration;

use hyper::Uri;

use crate::error::LoadTestError;

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Settings for one load test run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTestConfig {
    pub target: String,
    /// Number of workers, and the size of the client pool.
    pub concurrency: usize,
    /// Total requests across all workers; `0` runs until cancelled.
    pub request_budget: u64,
    /// Logged at startup, not enforced.
    pub requests_per_second: Option<u32>,
    pub request_timeout: Option<Duration>,
}

impl LoadTestConfig {
    #[must_use]
    pub fn new(target: impl Into<String>, concurrency: usize, request_budget: u64) -> Self {
        Self {
            target: target.into(),
            concurrency,
            request_budget,
            requests_per_second: None,
            request_timeout: None,
        }
    }

    #[must_use]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = Some(rps);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.request_budget == 0
    }

    /// Checks the target and concurrency, returning the parsed target.
    pub fn validate(&self) -> Result<Uri, LoadTestError> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(LoadTestError::EmptyTarget);
        }
        let uri = target
            .parse::<Uri>()
            .map_err(|e| LoadTestError::InvalidTarget {
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        match uri.scheme_str() {
            Some("http" | "https") => {}
            _ => return Err(LoadTestError::UnsupportedScheme(target.to_string())),
        }
        if uri.authority().is_none() {
            return Err(LoadTestError::InvalidTarget {
                target: target.to_string(),
                reason: "missing host".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(LoadTestError::InvalidConcurrency(self.concurrency));
        }
        Ok(uri)
    }
}
