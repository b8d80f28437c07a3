use thiserror::Error;

/// Errors that end a load test. Per-request failures never show up here.
#[derive(Debug, Error)]
pub enum LoadTestError {
    #[error("URL cannot be empty")]
    EmptyTarget,

    #[error("invalid URL {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("URL protocol must match one of: http, https. Got: {0}")]
    UnsupportedScheme(String),

    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("failed to create client for slot {slot}")]
    ClientConstruction {
        slot: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("worker {worker} terminated abnormally")]
    WorkerPanicked {
        worker: usize,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl LoadTestError {
    /// True for errors caused by the configuration itself, detected before anything runs.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyTarget
                | Self::InvalidTarget { .. }
                | Self::UnsupportedScheme(_)
                | Self::InvalidConcurrency(_)
        )
    }
}
