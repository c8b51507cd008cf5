//! Phase execution: run one phase's hooks strictly in sequence.

use std::time::Duration;

use serde::Serialize;
use strider_core::{emit_hook_failed, emit_phase_finished, Phase, METRICS};
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::hook::ResolvedHook;

/// Exit code reported for a hook that exceeded its deadline.
pub const EXIT_TIMED_OUT: i32 = 124;

/// Exit code reported for a callback hook that panicked.
pub const EXIT_PANICKED: i32 = 101;

/// Result of running one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseOutcome {
    pub phase: Phase,

    /// First non-zero hook exit code, or 0. Always 0 for cleanup.
    pub exit_code: i32,

    /// Whether this phase may fail the job (false for cleanup).
    pub can_fail: bool,

    pub hooks_run: usize,
}

impl PhaseOutcome {
    /// True when the phase fails the job.
    pub fn failed(&self) -> bool {
        self.can_fail && self.exit_code != 0
    }
}

/// Runs resolved hooks for a phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseExecutor {
    hook_timeout: Option<Duration>,
}

impl PhaseExecutor {
    /// `hook_timeout` of `None` waits for every hook indefinitely.
    pub fn new(hook_timeout: Option<Duration>) -> Self {
        Self { hook_timeout }
    }

    /// Per-hook deadline, if any.
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout
    }

    /// Run `hooks` in order.
    ///
    /// Outside cleanup the first non-zero exit code stops the phase. Cleanup
    /// runs every hook and only logs failures.
    pub async fn run(
        &self,
        phase: Phase,
        hooks: &[ResolvedHook],
        ctx: &ExecutionContext,
    ) -> PhaseOutcome {
        let job_id = ctx.job().job_id.as_str();
        let mut outcome = PhaseOutcome {
            phase,
            exit_code: 0,
            can_fail: phase.can_fail(),
            hooks_run: 0,
        };

        for resolved in hooks {
            let code = self.run_hook(phase, resolved, ctx).await;
            outcome.hooks_run += 1;
            METRICS.inc_hooks_run();
            debug!(
                phase = %phase,
                source = %resolved.source,
                hook = %resolved.hook.describe(),
                exit_code = code,
                "hook for phase complete"
            );

            if code == 0 {
                continue;
            }
            emit_hook_failed(job_id, phase, &resolved.source, code);
            if outcome.can_fail {
                outcome.exit_code = code;
                break;
            }
        }

        emit_phase_finished(job_id, phase, outcome.hooks_run, outcome.exit_code);
        outcome
    }

    /// Run a single hook on its own task so a panic or deadline maps to an
    /// exit code instead of tearing down the job.
    async fn run_hook(&self, phase: Phase, resolved: &ResolvedHook, ctx: &ExecutionContext) -> i32 {
        let hook = resolved.hook.clone();
        let task_ctx = ctx.clone();
        let mut handle = tokio::spawn(async move { hook.run(phase, &task_ctx).await });

        let joined = match self.hook_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // Dropping the hook future kills the process group of any
                    // child it spawned. Wait for that before moving on.
                    handle.abort();
                    let _ = handle.await;
                    METRICS.inc_hooks_timed_out();
                    warn!(phase = %phase, source = %resolved.source, timeout = ?limit, "hook timed out");
                    ctx.strider_message(&format!(
                        "Hook {} timed out after {:?} in phase {}",
                        resolved.source, limit, phase
                    ))
                    .await;
                    return EXIT_TIMED_OUT;
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(code) => code,
            Err(e) => {
                warn!(phase = %phase, source = %resolved.source, error = %e, "hook did not finish");
                ctx.strider_message(&format!("Hook {} crashed in phase {}", resolved.source, phase))
                    .await;
                EXIT_PANICKED
            }
        }
    }
}
