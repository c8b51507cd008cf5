//! Shared fakes for pipeline and queue tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strider_ci::{
    Action, DeployTarget, DetectionMatch, DetectionResult, DetectionRule, Detector,
    ExecutionContext, GitOutput, GitRunner, JobPipeline, Registry,
};
use strider_core::{DeployConfig, Job, RepoConfig, Result, StatusEvent, StriderError};
use tokio::sync::mpsc;

/// Git fake: "clones" by creating the target directory and seeding files.
#[derive(Default)]
pub struct FakeGit {
    pub seed_files: Vec<&'static str>,
    pub fail_clone: bool,
    pub commands: Mutex<Vec<String>>,
}

impl FakeGit {
    pub fn seeded(files: &[&'static str]) -> Self {
        Self {
            seed_files: files.to_vec(),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Last single-quoted argument of a command.
fn clone_target(command: &str) -> PathBuf {
    PathBuf::from(command.rsplit('\'').nth(1).unwrap())
}

#[async_trait]
impl GitRunner for FakeGit {
    async fn run(&self, _cwd: &Path, _credential: &str, command: &str) -> Result<GitOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        if !command.starts_with("git clone") {
            return Ok(GitOutput {
                exit_code: 0,
                stdout: format!("{command}: ok\n"),
                stderr: String::new(),
            });
        }
        if self.fail_clone {
            return Ok(GitOutput {
                exit_code: 128,
                stdout: String::new(),
                stderr: "fatal: repository not found\n".to_string(),
            });
        }

        let dir = clone_target(command);
        std::fs::create_dir_all(dir.join(".git"))?;
        for file in &self.seed_files {
            std::fs::write(dir.join(file), "")?;
        }
        Ok(GitOutput {
            exit_code: 0,
            stdout: "Cloning into 'repo'...\n".to_string(),
            stderr: "remote: Counting objects: 3, done.\n".to_string(),
        })
    }
}

/// Detector fake returning fixed matches.
pub struct StaticDetector(pub Vec<DetectionMatch>);

impl StaticDetector {
    pub fn of(rules: Vec<DetectionRule>) -> Self {
        Self(rules.iter().map(DetectionMatch::from).collect())
    }
}

#[async_trait]
impl Detector for StaticDetector {
    async fn detect(&self, _working_dir: &Path, _rules: &[DetectionRule]) -> Result<DetectionResult> {
        Ok(DetectionResult::new(self.0.clone()))
    }
}

pub struct FailingDetector;

#[async_trait]
impl Detector for FailingDetector {
    async fn detect(&self, _working_dir: &Path, _rules: &[DetectionRule]) -> Result<DetectionResult> {
        Err(StriderError::Detection("rules could not be evaluated".to_string()))
    }
}

/// Deploy target fake counting invocations.
pub struct CountingDeploy {
    pub calls: AtomicUsize,
    pub code: i32,
}

impl CountingDeploy {
    pub fn new(code: i32) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            code,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeployTarget for CountingDeploy {
    fn name(&self) -> &str {
        "fake-target"
    }

    async fn deploy(&self, ctx: &ExecutionContext, config: &DeployConfig) -> i32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.strider_message(&format!("deploying {}", config.app)).await;
        self.code
    }
}

/// Callback action that counts its runs and returns `code`.
pub fn counting_action(name: &str, calls: Arc<AtomicUsize>, code: i32) -> Action {
    Action::callback(name.to_string(), move |_ctx| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            code
        }
    })
}

pub fn job(id: &str) -> Job {
    Job {
        job_id: id.to_string(),
        user_id: "user-1".to_string(),
        repo_ssh_url: "git@github.com:acme/widgets.git".to_string(),
        repo_config: RepoConfig {
            url: "https://github.com/acme/widgets".to_string(),
            ..RepoConfig::default()
        },
        deploy_config: None,
    }
}

/// Pipeline wired to fakes, plus the receiving end of its event sink.
pub fn pipeline(
    registry: Registry,
    git: Arc<dyn GitRunner>,
    detector: Arc<dyn Detector>,
    data_dir: &Path,
) -> (JobPipeline, mpsc::UnboundedReceiver<StatusEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pipeline = JobPipeline::new(Arc::new(registry), Arc::new(tx), data_dir)
        .with_git_runner(git)
        .with_detector(detector);
    (pipeline, rx)
}

/// Everything emitted so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The single `job_complete` among `events`.
pub fn completion(events: &[StatusEvent]) -> &strider_core::StatusPayload {
    let completes: Vec<_> = events.iter().filter(|e| e.is_complete()).collect();
    assert_eq!(completes.len(), 1, "expected exactly one job_complete");
    completes[0].payload()
}
