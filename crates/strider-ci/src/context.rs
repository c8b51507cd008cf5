//! Capability bundle handed to callback-style hooks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strider_core::{Job, JobUpdate, Result, StriderError};
use tokio::sync::broadcast;

use crate::reporter::StatusReporter;
use crate::runner::{ProcessOutput, ProcessRunner, ProcessSpec};

/// Package manager command for Node.js projects.
pub const NODE_PACKAGE_CMD: &str = "npm";

const CONTEXT_EVENT_CAPACITY: usize = 64;

/// Hook-internal signal on the per-job event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEvent {
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Per-job execution context. Cheap to clone; never shared across jobs.
#[derive(Clone)]
pub struct ExecutionContext {
    runner: ProcessRunner,
    reporter: Arc<StatusReporter>,
    working_dir: PathBuf,
    job: Arc<Job>,
    events: broadcast::Sender<ContextEvent>,
}

impl ExecutionContext {
    /// Build the context for one job, with a process runner bound to its reporter and env.
    pub fn new(job: Arc<Job>, working_dir: PathBuf, reporter: Arc<StatusReporter>) -> Self {
        let runner = ProcessRunner::new(reporter.clone(), job.repo_config.env.clone());
        let (events, _) = broadcast::channel(CONTEXT_EVENT_CAPACITY);
        Self {
            runner,
            reporter,
            working_dir,
            job,
            events,
        }
    }

    /// Spawn a process with explicit spec.
    pub async fn fork_proc(&self, spec: ProcessSpec) -> Result<ProcessOutput> {
        self.runner.spawn(spec).await
    }

    /// Run a shell command in the working directory.
    pub async fn shell(&self, command: &str) -> Result<ProcessOutput> {
        self.runner.shell(&self.working_dir, command).await
    }

    /// Run a whitespace-separated command line in the working directory.
    pub async fn run_command_line(&self, line: &str) -> Result<ProcessOutput> {
        let spec = ProcessSpec::from_command_line(&self.working_dir, line).ok_or_else(|| {
            StriderError::Spawn {
                program: String::new(),
                cwd: self.working_dir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
            }
        })?;
        self.runner.spawn(spec).await
    }

    /// Emit (and buffer) a raw status update.
    pub async fn update_status(&self, update: JobUpdate) {
        self.reporter.update(update).await;
    }

    /// Emit a synthetic `[STRIDER]` message.
    pub async fn strider_message(&self, text: &str) {
        self.reporter.message(text).await;
    }

    /// The job's working copy.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn reporter(&self) -> &Arc<StatusReporter> {
        &self.reporter
    }

    /// Sender side of the per-job event channel.
    pub fn events(&self) -> &broadcast::Sender<ContextEvent> {
        &self.events
    }

    /// Receive signals broadcast by other hooks of this job.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    /// Broadcast a signal; returns how many subscribers received it.
    pub fn signal(&self, name: &str, payload: serde_json::Value) -> usize {
        self.events
            .send(ContextEvent {
                name: name.to_string(),
                payload,
            })
            .unwrap_or(0)
    }
}
