//! Deploy targets.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use strider_core::DeployConfig;
use tracing::{info, warn};

use crate::action::CallbackAction;
use crate::context::ExecutionContext;
use crate::git::{shell_quote, GitOutput, GitRunner};

/// Something a job can deploy to. Returns 0 on success.
#[async_trait]
pub trait DeployTarget: Send + Sync {
    fn name(&self) -> &str;

    async fn deploy(&self, ctx: &ExecutionContext, config: &DeployConfig) -> i32;
}

const HEROKU_REMOTE: &str = "heroku";

/// Pushes the working copy to a Heroku app over git.
#[derive(Clone)]
pub struct HerokuDeploy {
    git: Arc<dyn GitRunner>,
}

impl HerokuDeploy {
    /// Deploy through `git`, which also carries the deploy key.
    pub fn new(git: Arc<dyn GitRunner>) -> Self {
        Self { git }
    }

    /// Git remote for a Heroku app.
    pub fn remote_url(app: &str) -> String {
        format!("git@heroku.com:{app}.git")
    }

    /// Run one git step, forwarding its output. `None` if it could not run.
    async fn step(&self, ctx: &ExecutionContext, key: &str, command: &str) -> Option<GitOutput> {
        match self.git.run(ctx.working_dir(), key, command).await {
            Ok(output) => {
                output.report(ctx.reporter()).await;
                Some(output)
            }
            Err(e) => {
                warn!(command = %command, error = %e, "deploy step could not run");
                ctx.strider_message(&format!("Failed to run `{command}`: {e}")).await;
                None
            }
        }
    }

    async fn configure_remote(&self, ctx: &ExecutionContext, config: &DeployConfig) -> bool {
        let url = shell_quote(&Self::remote_url(&config.app));
        let add = format!("git remote add {HEROKU_REMOTE} {url}");
        match self.step(ctx, &config.privkey, &add).await {
            Some(out) if out.success() => true,
            Some(out) if out.stderr.contains("already exists") => {
                let set = format!("git remote set-url {HEROKU_REMOTE} {url}");
                matches!(self.step(ctx, &config.privkey, &set).await, Some(out) if out.success())
            }
            _ => false,
        }
    }
}

#[async_trait]
impl DeployTarget for HerokuDeploy {
    fn name(&self) -> &str {
        "heroku"
    }

    async fn deploy(&self, ctx: &ExecutionContext, config: &DeployConfig) -> i32 {
        info!(app = %config.app, "deploying to heroku");
        ctx.strider_message("Deploying to Heroku ...").await;

        let pushed = self.configure_remote(ctx, config).await
            && matches!(
                self.step(ctx, &config.privkey, &format!("git push {HEROKU_REMOTE} --force master")).await,
                Some(out) if out.success()
            );

        if pushed {
            ctx.strider_message("Deployment to Heroku successful.").await;
            0
        } else {
            ctx.strider_message("Deployment to Heroku unsuccessful.").await;
            1
        }
    }
}

/// Deploy-phase hook wrapping a target for one job.
///
/// Remembers the exit code it reported so the completion event can carry it.
pub struct DeployHook {
    target: Arc<dyn DeployTarget>,
    config: DeployConfig,
    exit_code: OnceLock<i32>,
}

impl DeployHook {
    pub fn new(target: Arc<dyn DeployTarget>, config: DeployConfig) -> Self {
        Self {
            target,
            config,
            exit_code: OnceLock::new(),
        }
    }

    /// Exit code of the deploy, if it ran.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.get().copied()
    }
}

#[async_trait]
impl CallbackAction for DeployHook {
    fn name(&self) -> &str {
        self.target.name()
    }

    async fn run(&self, ctx: &ExecutionContext) -> i32 {
        let code = self.target.deploy(ctx, &self.config).await;
        if self.exit_code.set(code).is_err() {
            warn!(target = %self.target.name(), "deploy hook ran more than once");
        }
        code
    }
}
