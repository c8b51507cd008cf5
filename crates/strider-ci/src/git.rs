//! Repository synchronization.
//!
//! Working copies live under the data directory, one per repository, and
//! are updated in place for later jobs on the same repository.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use strider_core::{Job, JobUpdate, Result, StriderError, PLATFORM_ENV_VAR, PLATFORM_NAME};
use tokio::process::Command;
use tracing::{debug, info};

use crate::reporter::StatusReporter;

/// Hex characters of the URL digest appended to the directory name.
const URL_DIGEST_LEN: usize = 12;

/// Captured result of one git command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// True when git exited 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Emit the captured output as one update and buffer it on the job.
    pub async fn report(&self, reporter: &StatusReporter) {
        reporter
            .update(JobUpdate {
                stdout: Some(self.stdout.clone()),
                stderr: Some(self.stderr.clone()),
                autodetect_result: None,
            })
            .await;
    }
}

/// Runs git commands with an SSH credential.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `command` in `cwd`. `credential` is a private key; empty means none.
    ///
    /// `Err` means the command could not be run at all; a non-zero exit is
    /// reported through [`GitOutput::exit_code`].
    async fn run(&self, cwd: &Path, credential: &str, command: &str) -> Result<GitOutput>;
}

/// Runs commands through `sh -c`, exposing the key via `GIT_SSH_COMMAND`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellGitRunner;

#[async_trait]
impl GitRunner for ShellGitRunner {
    async fn run(&self, cwd: &Path, credential: &str, command: &str) -> Result<GitOutput> {
        debug!(cwd = %cwd.display(), command = %command, "running git command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .env(PLATFORM_ENV_VAR, PLATFORM_NAME)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Held until the command exits; the file is removed on drop.
        let key_file = if credential.trim().is_empty() {
            None
        } else {
            let file = write_key_file(credential)?;
            cmd.env("GIT_SSH_COMMAND", ssh_command(file.path()));
            Some(file)
        };

        let output = cmd.output().await.map_err(|source| StriderError::Spawn {
            program: "sh".to_string(),
            cwd: cwd.to_path_buf(),
            source,
        })?;
        drop(key_file);

        Ok(GitOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn write_key_file(credential: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(credential.as_bytes())?;
    if !credential.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

fn ssh_command(key_path: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no",
        shell_quote(&key_path.to_string_lossy())
    )
}

/// Single-quote `s` for `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Working directory for a job's repository:
/// `<data_dir>/<basename>-<first 12 hex chars of sha256(url)>`.
pub fn working_dir_for(data_dir: &Path, job: &Job) -> PathBuf {
    let digest = hex::encode(Sha256::digest(job.repo_ssh_url.as_bytes()));
    data_dir.join(format!("{}-{}", job.repo_basename(), &digest[..URL_DIGEST_LEN]))
}

/// Clones or updates working copies through a [`GitRunner`].
#[derive(Clone)]
pub struct RepoSync {
    git: Arc<dyn GitRunner>,
    data_dir: PathBuf,
}

impl RepoSync {
    /// Sync working copies under `data_dir`.
    pub fn new(git: Arc<dyn GitRunner>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            git,
            data_dir: data_dir.into(),
        }
    }

    /// Bring the job's working copy up to date and return its path.
    ///
    /// An existing checkout is hard-reset and pulled; anything else at that
    /// path is removed and cloned fresh.
    pub async fn sync(&self, job: &Job, reporter: &StatusReporter) -> Result<PathBuf> {
        let dir = working_dir_for(&self.data_dir, job);
        let url = &job.repo_ssh_url;
        let credential = job.repo_config.privkey.as_str();

        if tokio::fs::try_exists(dir.join(".git")).await.unwrap_or(false) {
            info!(dir = %dir.display(), "updating existing working copy");
            reporter.message(&format!("Updating repo from {url}")).await;
            self.run_step(&dir, credential, "git reset --hard", reporter).await?;
            self.run_step(&dir, credential, "git pull", reporter).await?;
        } else {
            if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                debug!(dir = %dir.display(), "removing stale working directory");
                tokio::fs::remove_dir_all(&dir).await?;
            }
            tokio::fs::create_dir_all(&self.data_dir).await?;
            info!(dir = %dir.display(), "cloning repository");
            reporter.message(&format!("Starting git clone of repo at {url}")).await;
            let command = format!(
                "git clone --recursive {} {}",
                shell_quote(url),
                shell_quote(&dir.to_string_lossy())
            );
            self.run_step(&self.data_dir, credential, &command, reporter).await?;
        }

        reporter.message("Git clone complete").await;
        Ok(dir)
    }

    async fn run_step(
        &self,
        cwd: &Path,
        credential: &str,
        command: &str,
        reporter: &StatusReporter,
    ) -> Result<GitOutput> {
        let output = self
            .git
            .run(cwd, credential, command)
            .await
            .map_err(|e| StriderError::Sync(format!("`{command}` could not run: {e}")))?;
        output.report(reporter).await;
        if !output.success() {
            return Err(StriderError::Sync(format!(
                "`{command}` exited with code {}",
                output.exit_code
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use strider_core::{NullSink, RepoConfig};

    #[derive(Default)]
    struct RecordingGit {
        commands: Mutex<Vec<(PathBuf, String)>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl GitRunner for RecordingGit {
        async fn run(&self, cwd: &Path, _credential: &str, command: &str) -> Result<GitOutput> {
            self.commands
                .lock()
                .unwrap()
                .push((cwd.to_path_buf(), command.to_string()));
            let exit_code = match self.fail_on {
                Some(needle) if command.contains(needle) => 128,
                _ => 0,
            };
            Ok(GitOutput {
                exit_code,
                stdout: format!("ran {command}\n"),
                stderr: String::new(),
            })
        }
    }

    fn job(url: &str) -> Job {
        Job {
            job_id: "sync-job".to_string(),
            user_id: "user".to_string(),
            repo_ssh_url: url.to_string(),
            repo_config: RepoConfig::default(),
            deploy_config: None,
        }
    }

    fn reporter(job: &Job) -> StatusReporter {
        StatusReporter::new(job, Arc::new(NullSink))
    }

    #[test]
    fn test_working_dir_is_keyed_by_repository() {
        let data = Path::new("/data");
        let a = working_dir_for(data, &job("git@github.com:acme/app.git"));
        let b = working_dir_for(data, &job("git@github.com:other/app.git"));
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("app-"));
        assert_eq!(name.len(), "app-".len() + URL_DIGEST_LEN);
        assert_eq!(a, working_dir_for(data, &job("git@github.com:acme/app.git")));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_fresh_sync_clones() {
        let data = tempfile::tempdir().unwrap();
        let git = Arc::new(RecordingGit::default());
        let sync = RepoSync::new(git.clone(), data.path());
        let job = job("git@github.com:acme/app.git");
        let reporter = reporter(&job);

        let dir = sync.sync(&job, &reporter).await.unwrap();

        let commands = git.commands.lock().unwrap().clone();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, data.path());
        assert!(commands[0].1.starts_with("git clone --recursive 'git@github.com:acme/app.git'"));
        assert!(commands[0].1.contains(&*dir.to_string_lossy()));

        let buffers = reporter.snapshot().await;
        assert!(buffers.stdout.starts_with("[STRIDER] Starting git clone of repo at git@github.com:acme/app.git\n"));
        assert!(buffers.stdout.contains("ran git clone"));
        assert!(buffers.stdout.ends_with("[STRIDER] Git clone complete\n"));
    }

    #[tokio::test]
    async fn test_existing_checkout_is_reset_then_pulled() {
        let data = tempfile::tempdir().unwrap();
        let job = job("git@github.com:acme/app.git");
        let dir = working_dir_for(data.path(), &job);
        std::fs::create_dir_all(dir.join(".git")).unwrap();

        let git = Arc::new(RecordingGit::default());
        let sync = RepoSync::new(git.clone(), data.path());
        let reporter = reporter(&job);
        assert_eq!(sync.sync(&job, &reporter).await.unwrap(), dir);

        let commands: Vec<_> = git.commands.lock().unwrap().iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(commands, vec!["git reset --hard", "git pull"]);
        let buffers = reporter.snapshot().await;
        assert!(buffers.stdout.starts_with("[STRIDER] Updating repo from"));
    }

    #[tokio::test]
    async fn test_stale_directory_is_replaced() {
        let data = tempfile::tempdir().unwrap();
        let job = job("git@github.com:acme/app.git");
        let dir = working_dir_for(data.path(), &job);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("leftover"), "x").unwrap();

        let sync = RepoSync::new(Arc::new(RecordingGit::default()), data.path());
        sync.sync(&job, &reporter(&job)).await.unwrap();
        assert!(!dir.join("leftover").exists());
    }

    #[tokio::test]
    async fn test_failed_command_is_sync_error() {
        let data = tempfile::tempdir().unwrap();
        let git = Arc::new(RecordingGit {
            fail_on: Some("clone"),
            ..RecordingGit::default()
        });
        let sync = RepoSync::new(git, data.path());
        let job = job("git@github.com:acme/app.git");
        let reporter = reporter(&job);

        let err = sync.sync(&job, &reporter).await.unwrap_err();
        assert!(matches!(err, StriderError::Sync(_)));
        assert!(err.to_string().contains("128"));
        assert!(!reporter.snapshot().await.stdout.contains("Git clone complete"));
    }

    #[tokio::test]
    async fn test_shell_runner_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellGitRunner
            .run(dir.path(), "", "echo out; echo err 1>&2; exit 3")
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_shell_runner_exposes_key_through_ssh_command() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellGitRunner
            .run(dir.path(), "KEY", "printf '%s' \"$GIT_SSH_COMMAND\"")
            .await
            .unwrap();
        assert!(out.stdout.starts_with("ssh -i '"));
        assert!(out.stdout.contains("StrictHostKeyChecking=no"));

        let plain = ShellGitRunner
            .run(dir.path(), "", "printf '%s' \"${GIT_SSH_COMMAND:-none}\"")
            .await
            .unwrap();
        assert_eq!(plain.stdout, "none");
    }
}
