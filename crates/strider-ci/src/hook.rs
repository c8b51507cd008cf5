//! Hook resolution: turn a contributed phase entry into something runnable.

use std::sync::Arc;

use strider_core::Phase;
use tracing::{debug, info, warn};

use crate::action::{Action, CallbackAction, PhaseActions};
use crate::context::ExecutionContext;

/// Exit code reported when a shell hook's process cannot be spawned.
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Anything that contributes phase actions: detection matches and build hooks.
pub trait HookSource {
    fn source_name(&self) -> &str;
    fn actions(&self) -> &PhaseActions;
}

/// A runnable hook, resolved once per (source, phase).
#[derive(Clone)]
pub enum Hook {
    /// The source has nothing for this phase; reports success.
    NoOp,
    /// Run through `sh -c` in the working directory.
    Shell(String),
    /// Delegate to the callback, which reports its own exit code.
    Callback(Arc<dyn CallbackAction>),
}

impl Hook {
    /// Resolve a source's entry for `phase`; a missing entry is a no-op.
    pub fn resolve(actions: &PhaseActions, phase: Phase) -> Hook {
        match actions.get(phase) {
            None => Hook::NoOp,
            Some(Action::Shell(cmd)) => Hook::Shell(cmd.clone()),
            Some(Action::Callback(cb)) => Hook::Callback(cb.clone()),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Hook::NoOp)
    }

    /// Short label for logs: the command, or the callback's name.
    pub fn describe(&self) -> String {
        match self {
            Hook::NoOp => "no-op".to_string(),
            Hook::Shell(cmd) => cmd.clone(),
            Hook::Callback(cb) => format!("callback:{}", cb.name()),
        }
    }

    /// Run the hook and return its exit code.
    pub async fn run(&self, phase: Phase, ctx: &ExecutionContext) -> i32 {
        match self {
            Hook::NoOp => {
                debug!(phase = %phase, "running no-op hook");
                0
            }
            Hook::Shell(cmd) => {
                info!(phase = %phase, command = %cmd, "running shell command hook");
                match ctx.shell(cmd).await {
                    Ok(out) => out.exit_code,
                    Err(e) => {
                        warn!(phase = %phase, command = %cmd, error = %e, "shell hook could not start");
                        ctx.strider_message(&format!("Failed to run `{cmd}`: {e}")).await;
                        EXIT_SPAWN_FAILED
                    }
                }
            }
            Hook::Callback(cb) => {
                info!(phase = %phase, hook = %cb.name(), "running function hook");
                cb.run(ctx).await
            }
        }
    }
}

/// A hook plus the name of whoever contributed it.
#[derive(Clone)]
pub struct ResolvedHook {
    pub source: String,
    pub hook: Hook,
}

impl ResolvedHook {
    pub fn new(source: impl Into<String>, hook: Hook) -> Self {
        Self {
            source: source.into(),
            hook,
        }
    }
}

/// Resolve every source for one phase, preserving source order.
pub fn resolve_phase(phase: Phase, sources: &[&dyn HookSource]) -> Vec<ResolvedHook> {
    sources
        .iter()
        .map(|source| ResolvedHook::new(source.source_name(), Hook::resolve(source.actions(), phase)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use strider_core::{Job, NullSink, RepoConfig, PHASES};

    use crate::reporter::StatusReporter;

    struct Source(&'static str, PhaseActions);

    impl HookSource for Source {
        fn source_name(&self) -> &str {
            self.0
        }
        fn actions(&self) -> &PhaseActions {
            &self.1
        }
    }

    fn context(dir: &Path) -> ExecutionContext {
        let job = Arc::new(Job {
            job_id: "hook-job".to_string(),
            user_id: "user".to_string(),
            repo_ssh_url: "git@example.com:acme/app.git".to_string(),
            repo_config: RepoConfig::default(),
            deploy_config: None,
        });
        let reporter = Arc::new(StatusReporter::new(&job, Arc::new(NullSink)));
        ExecutionContext::new(job, dir.to_path_buf(), reporter)
    }

    #[test]
    fn test_missing_entry_resolves_to_noop_for_every_phase() {
        let empty = PhaseActions::new();
        for phase in PHASES {
            assert!(Hook::resolve(&empty, phase).is_noop());
        }
    }

    #[test]
    fn test_resolution_by_shape() {
        let actions = PhaseActions::new()
            .with(Phase::Prepare, Action::shell("make deps"))
            .with(Phase::Test, Action::callback("suite", |_ctx| async { 0 }));
        assert!(matches!(Hook::resolve(&actions, Phase::Prepare), Hook::Shell(ref c) if c == "make deps"));
        assert!(matches!(Hook::resolve(&actions, Phase::Test), Hook::Callback(_)));
        assert!(Hook::resolve(&actions, Phase::Deploy).is_noop());
    }

    #[test]
    fn test_resolve_phase_keeps_source_order() {
        let a = Source("a", PhaseActions::new().with(Phase::Test, Action::shell("a")));
        let b = Source("b", PhaseActions::new());
        let resolved = resolve_phase(Phase::Test, &[&a, &b]);
        let names: Vec<_> = resolved.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(resolved[1].hook.is_noop());
    }

    #[tokio::test]
    async fn test_noop_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Hook::NoOp.run(Phase::Cleanup, &context(dir.path())).await, 0);
    }

    #[tokio::test]
    async fn test_shell_hook_returns_process_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert_eq!(Hook::Shell("exit 4".into()).run(Phase::Test, &ctx).await, 4);
        assert_eq!(Hook::Shell("true".into()).run(Phase::Test, &ctx).await, 0);
    }

    #[tokio::test]
    async fn test_shell_hook_spawn_failure_is_127() {
        let ctx = context(Path::new("/definitely/not/a/dir"));
        let code = Hook::Shell("true".into()).run(Phase::Prepare, &ctx).await;
        assert_eq!(code, EXIT_SPAWN_FAILED);
        let buffers = ctx.reporter().snapshot().await;
        assert!(buffers.stdout.contains("[STRIDER] Failed to run `true`"));
    }

    #[tokio::test]
    async fn test_callback_hook_receives_context() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let action = Action::callback("job-id-check", |ctx: ExecutionContext| async move {
            if ctx.job().job_id == "hook-job" {
                0
            } else {
                9
            }
        });
        let hook = Hook::resolve(&PhaseActions::new().with(Phase::Test, action), Phase::Test);
        assert_eq!(hook.run(Phase::Test, &ctx).await, 0);
    }
}
