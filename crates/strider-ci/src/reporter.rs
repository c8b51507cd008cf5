//! Job status reporting.
//!
//! The reporter owns the job-level output buffers. Every chunk is appended to
//! the buffers and emitted as a `job_update` under one lock, so the order of
//! emitted merged chunks always matches the merged buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strider_core::{EventSink, Job, JobUpdate, StatusEvent, StatusPayload};
use tokio::sync::Mutex;
use tracing::warn;

use crate::output::OutputBuffers;

/// Prefix marking synthetic, worker-generated output lines.
pub const MESSAGE_PREFIX: &str = "[STRIDER]";

/// Emits `job_update` / `job_complete` events for one job.
pub struct StatusReporter {
    user_id: String,
    job_id: String,
    repo_url: String,
    started: Instant,
    sink: Arc<dyn EventSink>,
    buffers: Mutex<OutputBuffers>,
    completed: AtomicBool,
}

impl StatusReporter {
    /// Start the clock for a job.
    pub fn new(job: &Job, sink: Arc<dyn EventSink>) -> Self {
        Self {
            user_id: job.user_id.clone(),
            job_id: job.job_id.clone(),
            repo_url: job.repo_config.url.clone(),
            started: Instant::now(),
            sink,
            buffers: Mutex::new(OutputBuffers::new()),
            completed: AtomicBool::new(false),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Time since the reporter was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn payload(&self) -> StatusPayload {
        StatusPayload {
            user_id: self.user_id.clone(),
            job_id: self.job_id.clone(),
            time_elapsed: self.elapsed().as_secs_f64(),
            repo_url: self.repo_url.clone(),
            ..StatusPayload::default()
        }
    }

    /// Buffer and emit one incremental update.
    pub async fn update(&self, update: JobUpdate) {
        let mut buffers = self.buffers.lock().await;
        if let Some(out) = &update.stdout {
            buffers.push_stdout(out);
        }
        if let Some(err) = &update.stderr {
            buffers.push_stderr(err);
        }

        let stdmerged = update.merged();
        let payload = StatusPayload {
            stdout: update.stdout.unwrap_or_default(),
            stderr: update.stderr.unwrap_or_default(),
            stdmerged,
            autodetect_result: update.autodetect_result,
            ..self.payload()
        };
        self.sink.emit(StatusEvent::JobUpdate(payload));
    }

    /// Buffer and emit a stdout chunk.
    pub async fn stdout(&self, chunk: impl Into<String>) {
        self.update(JobUpdate::stdout(chunk)).await;
    }

    /// Buffer and emit a stderr chunk.
    pub async fn stderr(&self, chunk: impl Into<String>) {
        self.update(JobUpdate::stderr(chunk)).await;
    }

    /// Inject a synthetic message, prefixed with [`MESSAGE_PREFIX`].
    pub async fn message(&self, text: &str) {
        self.stdout(format_message(text)).await;
    }

    /// Emit the detection result on its own update.
    pub async fn detection(&self, result: serde_json::Value) {
        self.update(JobUpdate {
            autodetect_result: Some(result),
            ..JobUpdate::default()
        })
        .await;
    }

    /// Copy of the job-level buffers so far.
    pub async fn snapshot(&self) -> OutputBuffers {
        self.buffers.lock().await.clone()
    }

    /// Emit the terminal `job_complete` event with the full buffers.
    ///
    /// Only the first call emits; a job has exactly one completion report.
    pub async fn complete(
        &self,
        test_exit_code: Option<i32>,
        deploy_exit_code: Option<i32>,
    ) -> StatusPayload {
        let buffers = self.buffers.lock().await;
        let payload = StatusPayload {
            stdout: buffers.stdout.clone(),
            stderr: buffers.stderr.clone(),
            stdmerged: buffers.stdmerged.clone(),
            test_exit_code,
            deploy_exit_code,
            ..self.payload()
        };

        if self.completed.swap(true, Ordering::SeqCst) {
            warn!(job_id = %self.job_id, "job already completed, not emitting again");
        } else {
            self.sink.emit(StatusEvent::JobComplete(payload.clone()));
        }
        payload
    }
}

/// Format a synthetic message line.
pub fn format_message(text: &str) -> String {
    format!("{MESSAGE_PREFIX} {text}\n")
}
