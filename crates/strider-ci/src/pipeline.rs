//! Per-job orchestration: sync, detect, phases, guaranteed cleanup, report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strider_core::{
    emit_job_aborted, emit_job_completed, emit_job_started, job_span, EventSink, Job, Phase,
    StriderError, METRICS, PHASES,
};
use tracing::{debug, info, Instrument};

use crate::action::CallbackAction;
use crate::context::ExecutionContext;
use crate::deploy::{DeployHook, DeployTarget, HerokuDeploy};
use crate::detect::{DetectionResult, Detector, FileRuleDetector};
use crate::git::{GitRunner, RepoSync, ShellGitRunner};
use crate::hook::{resolve_phase, Hook, HookSource, ResolvedHook};
use crate::phase::{PhaseExecutor, PhaseOutcome};
use crate::registry::Registry;
use crate::reporter::StatusReporter;

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Passed,

    /// A non-cleanup phase reported a failing hook.
    Failed { phase: Phase, exit_code: i32 },

    /// Sync or detection failed; no phase ran.
    Aborted { reason: String },
}

/// Summary of one job run, kept by the worker for logging.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub outcome: JobOutcome,
    pub phases: Vec<PhaseOutcome>,
    pub test_exit_code: Option<i32>,
    pub deploy_exit_code: Option<i32>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// True when every phase passed.
    pub fn success(&self) -> bool {
        self.outcome == JobOutcome::Passed
    }

    /// Phases that actually ran, in order.
    pub fn phases_run(&self) -> Vec<Phase> {
        self.phases.iter().map(|p| p.phase).collect()
    }
}

/// Runs jobs one at a time against a frozen registry.
pub struct JobPipeline {
    registry: Arc<Registry>,
    sink: Arc<dyn EventSink>,
    data_dir: PathBuf,
    git: Arc<dyn GitRunner>,
    detector: Arc<dyn Detector>,
    deploy_target: Option<Arc<dyn DeployTarget>>,
    executor: PhaseExecutor,
}

impl JobPipeline {
    /// A pipeline using real git, file-rule detection and Heroku deploys.
    pub fn new(registry: Arc<Registry>, sink: Arc<dyn EventSink>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            sink,
            data_dir: data_dir.into(),
            git: Arc::new(ShellGitRunner),
            detector: Arc::new(FileRuleDetector),
            deploy_target: None,
            executor: PhaseExecutor::default(),
        }
    }

    /// Use `git` for repository sync and the default deploy target.
    pub fn with_git_runner(mut self, git: Arc<dyn GitRunner>) -> Self {
        self.git = git;
        self
    }

    /// Replace the file-rule detector.
    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    /// Deploy somewhere other than Heroku.
    pub fn with_deploy_target(mut self, target: Arc<dyn DeployTarget>) -> Self {
        self.deploy_target = Some(target);
        self
    }

    /// Cut off any hook that runs longer than `timeout`.
    pub fn with_hook_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.executor = PhaseExecutor::new(timeout);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The configured deploy target, or Heroku over this pipeline's git runner.
    fn deploy_target(&self) -> Arc<dyn DeployTarget> {
        match &self.deploy_target {
            Some(target) => target.clone(),
            None => Arc::new(HerokuDeploy::new(self.git.clone())),
        }
    }

    /// Run one job to completion. Always emits exactly one `job_complete`.
    pub async fn run(&self, job: Job) -> JobReport {
        let span = job_span(&job.job_id);
        self.run_job(Arc::new(job)).instrument(span).await
    }

    async fn run_job(&self, job: Arc<Job>) -> JobReport {
        emit_job_started(&job.job_id, &job.repo_ssh_url);
        let reporter = Arc::new(StatusReporter::new(&job, self.sink.clone()));

        let sync = RepoSync::new(self.git.clone(), &self.data_dir);
        let working_dir = match sync.sync(&job, &reporter).await {
            Ok(dir) => dir,
            Err(e) => return self.abort(&job, &reporter, e).await,
        };

        let detection = match self
            .detector
            .detect(&working_dir, self.registry.detection_rules())
            .await
        {
            Ok(result) => result,
            Err(e) => return self.abort(&job, &reporter, e).await,
        };
        reporter.detection(detection.summary()).await;

        let ctx = ExecutionContext::new(job.clone(), working_dir, reporter.clone());
        let deploy_hook = job
            .deploy_config
            .clone()
            .map(|config| Arc::new(DeployHook::new(self.deploy_target(), config)));

        let mut phases = Vec::with_capacity(PHASES.len());
        let mut failure: Option<(Phase, i32)> = None;
        for phase in PHASES {
            if failure.is_some() && phase.can_fail() {
                debug!(phase = %phase, "skipping phase after failure");
                continue;
            }

            let hooks = self.hooks_for(phase, &detection, deploy_hook.as_ref());
            let outcome = self.executor.run(phase, &hooks, &ctx).await;
            if outcome.failed() {
                info!(phase = %phase, exit_code = outcome.exit_code, "failure in phase, running cleanup and failing build");
                failure = Some((phase, outcome.exit_code));
            }
            phases.push(outcome);
        }

        let outcome = match failure {
            Some((phase, exit_code)) => JobOutcome::Failed { phase, exit_code },
            None => JobOutcome::Passed,
        };
        let test_exit_code = Some(failure.map_or(0, |(_, code)| code));
        let deploy_exit_code = deploy_hook.as_ref().and_then(|hook| hook.exit_code());

        self.finish(&job, &reporter, outcome, phases, test_exit_code, deploy_exit_code)
            .await
    }

    /// Detection matches first, then build hooks; the deploy hook leads the
    /// deploy phase.
    fn hooks_for(
        &self,
        phase: Phase,
        detection: &DetectionResult,
        deploy_hook: Option<&Arc<DeployHook>>,
    ) -> Vec<ResolvedHook> {
        let mut hooks = Vec::new();
        if phase == Phase::Deploy {
            if let Some(hook) = deploy_hook {
                let action: Arc<dyn CallbackAction> = hook.clone();
                hooks.push(ResolvedHook::new(hook.name(), Hook::Callback(action)));
            }
        }

        let sources: Vec<&dyn HookSource> = detection
            .matches
            .iter()
            .map(|m| m as &dyn HookSource)
            .chain(self.registry.build_hooks().iter().map(|h| h as &dyn HookSource))
            .collect();
        hooks.extend(resolve_phase(phase, &sources));
        hooks
    }

    async fn abort(&self, job: &Job, reporter: &StatusReporter, error: StriderError) -> JobReport {
        emit_job_aborted(&job.job_id, &error);
        reporter.message(&error.to_string()).await;
        self.finish(
            job,
            reporter,
            JobOutcome::Aborted {
                reason: error.to_string(),
            },
            Vec::new(),
            None,
            None,
        )
        .await
    }

    async fn finish(
        &self,
        job: &Job,
        reporter: &StatusReporter,
        outcome: JobOutcome,
        phases: Vec<PhaseOutcome>,
        test_exit_code: Option<i32>,
        deploy_exit_code: Option<i32>,
    ) -> JobReport {
        reporter.complete(test_exit_code, deploy_exit_code).await;

        let duration_ms = reporter.elapsed().as_millis() as u64;
        let success = outcome == JobOutcome::Passed;
        METRICS.inc_jobs_processed();
        if !success {
            METRICS.inc_jobs_failed();
        }
        emit_job_completed(&job.job_id, duration_ms, test_exit_code, success);

        JobReport {
            job_id: job.job_id.clone(),
            outcome,
            phases,
            test_exit_code,
            deploy_exit_code,
            duration_ms,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_core::{NullSink, RepoConfig};

    #[test]
    fn test_report_phases_run() {
        let report = JobReport {
            job_id: "j".to_string(),
            outcome: JobOutcome::Failed {
                phase: Phase::Prepare,
                exit_code: 1,
            },
            phases: vec![
                PhaseOutcome {
                    phase: Phase::Prepare,
                    exit_code: 1,
                    can_fail: true,
                    hooks_run: 1,
                },
                PhaseOutcome {
                    phase: Phase::Cleanup,
                    exit_code: 0,
                    can_fail: false,
                    hooks_run: 0,
                },
            ],
            test_exit_code: Some(1),
            deploy_exit_code: None,
            duration_ms: 3,
            finished_at: Utc::now(),
        };
        assert!(!report.success());
        assert_eq!(report.phases_run(), vec![Phase::Prepare, Phase::Cleanup]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"]["status"], "failed");
        assert_eq!(value["outcome"]["phase"], "prepare");
    }

    #[test]
    fn test_deploy_hook_leads_deploy_phase_only() {
        let pipeline = JobPipeline::new(Arc::new(Registry::with_defaults()), Arc::new(NullSink), "_work");
        let detection = DetectionResult::new(vec![
            crate::detect::DetectionMatch::from(&crate::registry::DetectionRule::node()),
            crate::detect::DetectionMatch::from(&crate::registry::DetectionRule::node()),
        ]);
        let deploy = Arc::new(DeployHook::new(
            pipeline.deploy_target(),
            strider_core::DeployConfig {
                app: "widgets".to_string(),
                privkey: String::new(),
            },
        ));

        let hooks = pipeline.hooks_for(Phase::Deploy, &detection, Some(&deploy));
        assert_eq!(hooks.len(), 3);
        assert_eq!(hooks[0].source, "heroku");
        assert_eq!(hooks.iter().filter(|h| h.source == "heroku").count(), 1);

        let prepare = pipeline.hooks_for(Phase::Prepare, &detection, Some(&deploy));
        assert!(prepare.iter().all(|h| h.source != "heroku"));
    }

    #[tokio::test]
    async fn test_unreachable_repository_aborts_job() {
        let data = tempfile::tempdir().unwrap();
        let pipeline = JobPipeline::new(Arc::new(Registry::with_defaults()), Arc::new(NullSink), data.path());
        let job = Job {
            job_id: "abort-job".to_string(),
            user_id: "user".to_string(),
            repo_ssh_url: data.path().join("no-such-repo").to_string_lossy().into_owned(),
            repo_config: RepoConfig::default(),
            deploy_config: None,
        };

        let report = pipeline.run(job).await;
        assert!(matches!(report.outcome, JobOutcome::Aborted { .. }));
        assert!(report.phases.is_empty());
        assert_eq!(report.test_exit_code, None);
        assert_eq!(report.deploy_exit_code, None);
    }
}
