//! Worker configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{Result, StriderError};

/// Top-level worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Root directory holding one working copy per repository.
    pub data_dir: PathBuf,

    /// Per-hook deadline in seconds. `None` waits indefinitely.
    pub hook_timeout_secs: Option<u64>,

    /// Emit newline-delimited JSON log lines.
    pub log_json: bool,

    /// Default log level when `RUST_LOG` is not set.
    pub log_level: String,

    /// Extra file-based detection rules, in registration order.
    pub detection_rules: Vec<RuleConfig>,

    /// Extra static build hooks, in registration order.
    pub build_hooks: Vec<HookConfig>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("_work"),
            hook_timeout_secs: None,
            log_json: false,
            log_level: "info".to_string(),
            detection_rules: Vec::new(),
            build_hooks: Vec::new(),
        }
    }
}

/// A detection rule declared in configuration. Actions are shell commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// File whose presence (or absence) selects this rule.
    pub filename: String,

    #[serde(default = "default_true")]
    pub exists: bool,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub framework: Option<String>,

    #[serde(default)]
    pub prepare: Option<String>,

    #[serde(default)]
    pub test: Option<String>,

    #[serde(default)]
    pub deploy: Option<String>,

    #[serde(default)]
    pub start: Option<String>,
}

/// A build hook declared in configuration. Actions are shell commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    pub name: String,

    #[serde(default)]
    pub prepare: Option<String>,

    #[serde(default)]
    pub test: Option<String>,

    #[serde(default)]
    pub deploy: Option<String>,

    #[serde(default)]
    pub cleanup: Option<String>,
}

fn default_true() -> bool {
    true
}

impl WorkerConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: WorkerConfig =
            toml::from_str(text).map_err(|e| StriderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StriderError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Per-hook deadline, if one is configured.
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.hook_timeout_secs == Some(0) {
            return Err(StriderError::Config(
                "hook_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(StriderError::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = WorkerConfig::from_toml_str("").expect("parse");
        assert_eq!(config, WorkerConfig::default());
        assert!(config.hook_timeout().is_none());
    }

    #[test]
    fn test_parse_rules_and_hooks() {
        let text = r#"
            data_dir = "/var/lib/strider"
            hook_timeout_secs = 600

            [[detection_rules]]
            filename = "setup.py"
            language = "python"
            prepare = "pip install -e ."
            test = "python setup.py test"

            [[build_hooks]]
            name = "tunnel"
            prepare = "./start-tunnel.sh"
            cleanup = "./stop-tunnel.sh"
        "#;
        let config = WorkerConfig::from_toml_str(text).expect("parse");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/strider"));
        assert_eq!(config.hook_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.detection_rules.len(), 1);
        assert!(config.detection_rules[0].exists);
        assert_eq!(config.build_hooks[0].cleanup.as_deref(), Some("./stop-tunnel.sh"));
    }

    #[test]
    fn test_non_text_action_is_rejected() {
        let text = r#"
            [[build_hooks]]
            name = "bad"
            test = 3
        "#;
        let err = WorkerConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, StriderError::Config(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = WorkerConfig::from_toml_str("hook_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("hook_timeout_secs"));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strider.toml");
        std::fs::write(&path, "log_json = true\nlog_level = \"debug\"\n").unwrap();
        let config = WorkerConfig::load(&path).unwrap();
        assert!(config.log_json);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = WorkerConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, StriderError::Config(_)));
    }
}
