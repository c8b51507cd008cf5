//! Job submission data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One build request, as carried by the job submission event.
///
/// Immutable for the duration of its execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    /// Unique job identifier.
    pub job_id: String,

    /// Owning user identifier.
    pub user_id: String,

    /// Remote the working copy is cloned from (usually an SSH URL).
    pub repo_ssh_url: String,

    /// Repository display URL, credential and environment overrides.
    pub repo_config: RepoConfig,

    /// Deploy target configuration, if the job should deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_config: Option<DeployConfig>,
}

/// Per-repository settings attached to a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    /// Repository URL reported back on every status event.
    pub url: String,

    /// VCS access credential (private key material).
    #[serde(default)]
    pub privkey: String,

    /// Environment overrides applied to every spawned process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Deploy target name plus its credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// Target application name.
    pub app: String,

    /// Credential used to push to the target.
    #[serde(default)]
    pub privkey: String,
}

impl Job {
    /// Repository basename with any trailing `.git` removed.
    pub fn repo_basename(&self) -> &str {
        let trimmed = self.repo_ssh_url.trim_end_matches('/');
        let name = trimmed
            .rsplit(|c: char| c == '/' || c == ':')
            .next()
            .unwrap_or(trimmed);
        name.strip_suffix(".git").unwrap_or(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(url: &str) -> Job {
        Job {
            job_id: "job-1".to_string(),
            user_id: "user-1".to_string(),
            repo_ssh_url: url.to_string(),
            repo_config: RepoConfig::default(),
            deploy_config: None,
        }
    }

    #[test]
    fn test_repo_basename_strips_git_suffix() {
        assert_eq!(job("git@github.com:acme/widgets.git").repo_basename(), "widgets");
        assert_eq!(job("https://example.com/acme/widgets").repo_basename(), "widgets");
        assert_eq!(job("git@example.com:widgets.git/").repo_basename(), "widgets");
    }

    #[test]
    fn test_deserialize_minimal_submission() {
        let json = r#"{
            "job_id": "j1",
            "user_id": "u1",
            "repo_ssh_url": "git@github.com:acme/widgets.git",
            "repo_config": { "url": "https://github.com/acme/widgets" }
        }"#;
        let job: Job = serde_json::from_str(json).expect("deserialize");
        assert_eq!(job.job_id, "j1");
        assert!(job.repo_config.env.is_empty());
        assert!(job.repo_config.privkey.is_empty());
        assert!(job.deploy_config.is_none());
    }

    #[test]
    fn test_deserialize_with_deploy_and_env() {
        let json = r#"{
            "job_id": "j2",
            "user_id": "u1",
            "repo_ssh_url": "git@github.com:acme/widgets.git",
            "repo_config": {
                "url": "https://github.com/acme/widgets",
                "privkey": "KEY",
                "env": { "NODE_ENV": "test" }
            },
            "deploy_config": { "app": "widgets-prod", "privkey": "HKEY" }
        }"#;
        let job: Job = serde_json::from_str(json).expect("deserialize");
        assert_eq!(job.repo_config.env.get("NODE_ENV").map(String::as_str), Some("test"));
        let deploy = job.deploy_config.expect("deploy config");
        assert_eq!(deploy.app, "widgets-prod");
    }
}
