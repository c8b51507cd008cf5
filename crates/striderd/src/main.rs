//! Strider worker daemon
//!
//! Reads job submissions as newline-delimited JSON on stdin and runs them
//! one at a time. Status events (`queue.job_update`, `queue.job_complete`)
//! are written to stdout as newline-delimited JSON; logs go to stderr.
//!
//! The worker exits once stdin closes and every submitted job has finished.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use strider_ci::{JobPipeline, JobQueue, Registry};
use strider_core::{init_tracing, parse_level, Job, StatusEvent, WorkerConfig, VERSION};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "striderd")]
#[command(author = "Strider Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Strider CI worker", long_about = None)]
struct Cli {
    /// Worker configuration file (TOML)
    #[arg(short, long, env = "STRIDER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding repository working copies
    #[arg(long, env = "STRIDER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Per-hook deadline in seconds (default: none)
    #[arg(long)]
    hook_timeout_secs: Option<u64>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// File configuration with command-line overrides applied.
fn resolve_config(cli: &Cli) -> Result<WorkerConfig> {
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => WorkerConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(secs) = cli.hook_timeout_secs {
        anyhow::ensure!(secs > 0, "--hook-timeout-secs must be greater than zero");
        config.hook_timeout_secs = Some(secs);
    }
    if cli.json {
        config.log_json = true;
    }
    Ok(config)
}

/// Parse one stdin line. Blank lines yield `None`.
fn parse_job(line: &str) -> Option<serde_json::Result<Job>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Submit every job read from `input` until EOF. Returns how many were queued.
async fn read_jobs<R: AsyncBufRead + Unpin>(input: R, queue: &JobQueue) -> Result<usize> {
    let mut lines = input.lines();
    let mut submitted = 0;
    while let Some(line) = lines.next_line().await.context("Failed to read job stream")? {
        match parse_job(&line) {
            None => continue,
            Some(Ok(job)) => {
                info!(job_id = %job.job_id, repo = %job.repo_ssh_url, "job received");
                queue.submit(job).await?;
                submitted += 1;
            }
            Some(Err(e)) => warn!(error = %e, "ignoring malformed job submission"),
        }
    }
    Ok(submitted)
}

/// Write each status event as one JSON line until every sender is gone.
async fn forward_events<W: AsyncWrite + Unpin>(
    mut rx: mpsc::UnboundedReceiver<StatusEvent>,
    mut out: W,
) -> Result<()> {
    while let Some(event) = rx.recv().await {
        let mut line = serde_json::to_vec(&event).context("Failed to encode status event")?;
        line.push(b'\n');
        out.write_all(&line).await.context("Failed to write status event")?;
        out.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        parse_level(&config.log_level)
    };
    init_tracing(config.log_json, level);

    let registry = Registry::from_config(&config).context("Failed to register build configuration")?;
    info!(
        version = VERSION,
        data_dir = %config.data_dir.display(),
        detection_rules = registry.detection_rules().len(),
        build_hooks = registry.build_hooks().len(),
        hook_timeout_secs = ?config.hook_timeout_secs,
        "striderd started"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_events(rx, tokio::io::stdout()));

    let pipeline = JobPipeline::new(Arc::new(registry), Arc::new(tx), config.data_dir.clone())
        .with_hook_timeout(config.hook_timeout());
    let (queue, worker) = JobQueue::start(Arc::new(pipeline));

    let submitted = read_jobs(BufReader::new(tokio::io::stdin()), &queue).await?;
    info!(submitted = submitted, "input closed, draining queue");

    queue.shutdown().await;
    let processed = worker.await.context("Job worker failed")?;
    forwarder.await.context("Event forwarder failed")??;

    info!(processed = processed, "striderd finished");
    Ok(())
}
