//! Strider CI - serial job execution
//!
//! Provides the worker's job pipeline:
//! - Syncs a working copy per repository and detects the project type
//! - Runs the fixed phases (prepare, test, deploy, cleanup) from detection
//!   matches and registered build hooks
//! - Streams process output as status events while buffering it per job
//! - Always runs cleanup, and processes one job at a time

pub mod action;
pub mod context;
pub mod deploy;
pub mod detect;
pub mod git;
pub mod hook;
pub mod output;
pub mod phase;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod runner;

// Re-export key types
pub use action::{Action, CallbackAction, FnAction, PhaseActions};
pub use context::{ContextEvent, ExecutionContext, NODE_PACKAGE_CMD};
pub use deploy::{DeployHook, DeployTarget, HerokuDeploy};
pub use detect::{DetectionMatch, DetectionResult, Detector, FileRuleDetector};
pub use git::{working_dir_for, GitOutput, GitRunner, RepoSync, ShellGitRunner};
pub use hook::{resolve_phase, Hook, HookSource, ResolvedHook, EXIT_SPAWN_FAILED};
pub use output::OutputBuffers;
pub use phase::{PhaseExecutor, PhaseOutcome, EXIT_PANICKED, EXIT_TIMED_OUT};
pub use pipeline::{JobOutcome, JobPipeline, JobReport};
pub use queue::JobQueue;
pub use registry::{BuildHook, DetectionRule, Registry};
pub use reporter::{format_message, StatusReporter, MESSAGE_PREFIX};
pub use runner::{ProcessOutput, ProcessRunner, ProcessSpec};
