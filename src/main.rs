//! Connpool - connection pool probe
//!
//! Loads a pool configuration, builds the configured pool and drives a batch
//! of concurrent acquisitions through it, reporting pool occupancy at the end.

use anyhow::Result;
use backoff::ExponentialBackoff;
use clap::Parser;
use connpool::config::load_config;
use connpool::connection::{ConnectionTimeouts, TcpConnection};
use connpool::error::PoolError;
use connpool::pool::{ConnectionSource, PoolHandle, PoolRegistry};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Connpool - drive concurrent requests through a connection pool
#[derive(Parser, Debug)]
#[command(name = "connpool")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,

    /// Total number of requests to issue
    #[arg(short, long, default_value_t = 100)]
    requests: usize,

    /// Number of concurrent workers
    #[arg(short = 'n', long, default_value_t = 8)]
    concurrency: usize,

    /// Establish each connection before using it
    #[arg(long)]
    verify: bool,

    /// Retries per request after the first failure
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

/// Per-request options shared by all workers
#[derive(Debug, Clone, Copy)]
struct ProbeOptions {
    timeouts: ConnectionTimeouts,
    max_wait: Option<Duration>,
    verify: bool,
    retries: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = load_config(&args.config)?;

    info!("Connpool v{}", connpool::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    let registry = PoolRegistry::<TcpConnection>::new();
    let handle = PoolHandle::from_config(&config, &registry)?;
    info!(
        "Pool: {} ({:?}, max_connections={})",
        handle.address(),
        config.pool.variant,
        config.pool.max_connections
    );

    let options = ProbeOptions {
        timeouts: ConnectionTimeouts::from_config(&config.timeouts),
        max_wait: config.pool.max_wait(),
        verify: args.verify,
        retries: args.retries,
    };

    let concurrency = args.concurrency.max(1);
    let mut workers = JoinSet::new();
    for worker in 0..concurrency {
        let count = args.requests / concurrency + usize::from(worker < args.requests % concurrency);
        let handle = handle.clone();
        workers.spawn(async move { run_worker(worker, handle, options, count).await });
    }

    let (mut succeeded, mut failed) = (0, 0);
    while let Some(result) = workers.join_next().await {
        let (ok, err) = result?;
        succeeded += ok;
        failed += err;
    }

    for pool in handle.pools() {
        let status = pool.status();
        info!(
            "Pool {}: capacity={}, idle={}, borrowed={}",
            pool.address(),
            status.capacity,
            status.idle,
            status.borrowed
        );
        pool.stats().log(pool.address());
    }
    info!("Probe finished: {} succeeded, {} failed", succeeded, failed);

    if failed > 0 {
        anyhow::bail!("{} of {} requests failed", failed, args.requests);
    }
    Ok(())
}

/// Issue `count` requests one after another
async fn run_worker(
    worker: usize,
    handle: PoolHandle<TcpConnection>,
    options: ProbeOptions,
    count: usize,
) -> (usize, usize) {
    let (mut succeeded, mut failed) = (0, 0);

    for request in 0..count {
        match probe_once(&handle, options).await {
            Ok(elapsed) => {
                debug!("Worker {} request {} done in {:?}", worker, request, elapsed);
                succeeded += 1;
            }
            Err(e) => {
                warn!("Worker {} request {} failed: {}", worker, request, e);
                failed += 1;
            }
        }
    }

    (succeeded, failed)
}

/// Borrow one connection, retrying with exponential backoff
async fn probe_once(
    handle: &PoolHandle<TcpConnection>,
    options: ProbeOptions,
) -> Result<Duration, PoolError> {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_secs(2),
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut attempt = 0u32;
    backoff::future::retry(policy, || {
        attempt += 1;
        let last_attempt = attempt > options.retries;
        async move {
            let started = Instant::now();
            let entry = handle
                .get_with(&options.timeouts, options.max_wait, options.verify)
                .await
                .map_err(|e| {
                    if last_attempt {
                        backoff::Error::permanent(e)
                    } else {
                        backoff::Error::transient(e)
                    }
                })?;

            debug!(
                "Borrowed connection from {} (peer {:?}, borrows {})",
                entry.pool_address(),
                entry.peer_addr(),
                entry.borrows()
            );
            Ok(started.elapsed())
        }
    })
    .await
}

/// Setup logging based on configuration
///
/// `RUST_LOG`, when set, takes precedence over `--log-level`.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
