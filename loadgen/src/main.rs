use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use loadgen::logging::{init_logging, LogFormat};
use loadgen::{HttpClientFactory, LoadTest, LoadTestConfig, LoadTestError, DEFAULT_CONCURRENCY};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Send concurrent GET requests to a URL and report how they went.
#[derive(Parser, Debug)]
#[command(name = "loadgen", version, about, long_about = None)]
struct Args {
    /// Target URL, http:// or https://
    url: String,

    /// Number of concurrent workers, each with its own client
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Total number of requests, 0 runs until interrupted
    #[arg(short = 'n', long = "requests", default_value_t = 0)]
    requests: u64,

    /// Requests per second. Accepted but not enforced
    #[arg(long)]
    rps: Option<u32>,

    /// Per request timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Stop the run after this many seconds
    #[arg(long, value_name = "SECS")]
    duration_secs: Option<u64>,

    /// Print the summary as json
    #[arg(long)]
    json: bool,

    /// Emit logs as json
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn load_test_config(&self) -> LoadTestConfig {
        let mut config = LoadTestConfig::new(self.url.clone(), self.concurrency, self.requests);
        if let Some(rps) = self.rps {
            config = config.with_requests_per_second(rps);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }
        config
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };
    let _guard = rt.enter();
    match rt.block_on(run_load_test(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<LoadTestError>() {
                Some(lte) if lte.is_config_error() => error!(error = %lte, "Invalid configuration"),
                _ => error!(error = %format!("{e:#}"), "Load test failed"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_load_test(args: Args) -> anyhow::Result<()> {
    let config = args.load_test_config();
    let factory = HttpClientFactory::new(config.request_timeout);
    let cancel = CancellationToken::new();
    spawn_stop_watcher(cancel.clone(), args.duration_secs.map(Duration::from_secs));

    let summary = LoadTest::new(config, factory).run(cancel.clone()).await;
    cancel.cancel();
    let summary = summary?;

    if args.json {
        let out = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{out}");
    } else {
        println!("{summary}");
    }
    Ok(())
}

/// Cancels the run on Ctrl-C or once `duration` elapses.
fn spawn_stop_watcher(cancel: CancellationToken, duration: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received, stopping workers"),
            () = deadline => info!("Run duration elapsed, stopping workers"),
        }
        cancel.cancel();
    });
}
