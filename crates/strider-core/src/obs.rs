//! Structured observability hooks for the job lifecycle.
//!
//! - A job-scoped tracing span for instrumenting the pipeline future
//! - Emission functions for job start, phase completion, hook failure and
//!   job completion

use tracing::{info, warn};

use crate::domain::Phase;

/// Span tagged with the job id, for instrumenting futures.
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("strider.job", job_id = %job_id)
}

/// Emit event: job dequeued and started.
pub fn emit_job_started(job_id: &str, repo_url: &str) {
    info!(event = "job.started", job_id = %job_id, repo_url = %repo_url);
}

/// Emit event: one phase finished running its hooks.
pub fn emit_phase_finished(job_id: &str, phase: Phase, hooks_run: usize, exit_code: i32) {
    info!(
        event = "phase.finished",
        job_id = %job_id,
        phase = %phase,
        hooks_run = hooks_run,
        exit_code = exit_code,
    );
}

/// Emit event: a hook reported a non-zero exit code.
pub fn emit_hook_failed(job_id: &str, phase: Phase, hook: &str, exit_code: i32) {
    warn!(
        event = "hook.failed",
        job_id = %job_id,
        phase = %phase,
        hook = %hook,
        exit_code = exit_code,
    );
}

/// Emit event: job aborted before any phase ran (sync or detection failure).
pub fn emit_job_aborted(job_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "job.aborted", job_id = %job_id, reason = %reason);
}

/// Emit event: completion report sent.
pub fn emit_job_completed(job_id: &str, duration_ms: u64, test_exit_code: Option<i32>, success: bool) {
    info!(
        event = "job.completed",
        job_id = %job_id,
        duration_ms = duration_ms,
        test_exit_code = ?test_exit_code,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_span_name() {
        let span = job_span("job-span-test");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "strider.job");
        }
    }
}
