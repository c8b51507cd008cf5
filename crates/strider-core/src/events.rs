//! Status events emitted to the external consumer.
//!
//! Two shapes share one payload: `queue.job_update` carries an incremental
//! chunk, `queue.job_complete` carries the full buffers and exit codes. Every
//! field is always serialized (empty strings / nulls included) so consumers
//! see a stable schema.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const JOB_UPDATE: &str = "queue.job_update";
pub const JOB_COMPLETE: &str = "queue.job_complete";

/// Fixed field set of every status event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub user_id: String,
    pub job_id: String,
    /// Seconds since the job started.
    pub time_elapsed: f64,
    pub repo_url: String,
    pub stdout: String,
    pub stderr: String,
    pub stdmerged: String,
    pub autodetect_result: Option<serde_json::Value>,
    pub test_exit_code: Option<i32>,
    pub deploy_exit_code: Option<i32>,
}

/// A status event, tagged with its event name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum StatusEvent {
    #[serde(rename = "queue.job_update")]
    JobUpdate(StatusPayload),

    #[serde(rename = "queue.job_complete")]
    JobComplete(StatusPayload),
}

impl StatusEvent {
    /// Event name as seen by consumers.
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::JobUpdate(_) => JOB_UPDATE,
            StatusEvent::JobComplete(_) => JOB_COMPLETE,
        }
    }

    /// The payload, whichever kind of event this is.
    pub fn payload(&self) -> &StatusPayload {
        match self {
            StatusEvent::JobUpdate(p) | StatusEvent::JobComplete(p) => p,
        }
    }

    /// True for `queue.job_complete`.
    pub fn is_complete(&self) -> bool {
        matches!(self, StatusEvent::JobComplete(_))
    }
}

/// Incremental content of one `job_update`.
///
/// The merged chunk is derived (stdout followed by stderr) so that the
/// concatenation of all merged chunks always equals the job's merged buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub autodetect_result: Option<serde_json::Value>,
}

impl JobUpdate {
    /// An update carrying only stdout text.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: Some(text.into()),
            ..Self::default()
        }
    }

    /// An update carrying only stderr text.
    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stderr: Some(text.into()),
            ..Self::default()
        }
    }

    /// Merged chunk for this update.
    pub fn merged(&self) -> String {
        let mut merged = String::new();
        if let Some(out) = &self.stdout {
            merged.push_str(out);
        }
        if let Some(err) = &self.stderr {
            merged.push_str(err);
        }
        merged
    }
}

/// Destination for status events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl EventSink for mpsc::UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        if self.send(event).is_err() {
            tracing::debug!("status event dropped: consumer has gone away");
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StatusEvent) {}
}
