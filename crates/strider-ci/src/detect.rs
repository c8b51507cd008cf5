//! Project detection.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use strider_core::{Result, StriderError};
use tracing::{debug, info};

use crate::action::PhaseActions;
use crate::hook::HookSource;
use crate::registry::DetectionRule;

/// One rule that matched the working copy.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionMatch {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,

    #[serde(flatten)]
    pub actions: PhaseActions,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
}

impl From<&DetectionRule> for DetectionMatch {
    fn from(rule: &DetectionRule) -> Self {
        Self {
            name: rule.name().to_string(),
            language: rule.language.clone(),
            framework: rule.framework.clone(),
            actions: rule.actions.clone(),
            start: rule.start.clone(),
        }
    }
}

impl HookSource for DetectionMatch {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> &PhaseActions {
        &self.actions
    }
}

/// Ordered matches for one job. Empty is a valid result.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub matches: Vec<DetectionMatch>,
}

impl DetectionResult {
    pub fn new(matches: Vec<DetectionMatch>) -> Self {
        Self { matches }
    }

    /// True when no rule matched.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// JSON form sent to consumers as `autodetectResult`.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::to_value(&self.matches).unwrap_or_default()
    }
}

/// Evaluates detection rules against a working copy.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, working_dir: &Path, rules: &[DetectionRule]) -> Result<DetectionResult>;
}

/// Matches rules on file existence, in rule order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRuleDetector;

#[async_trait]
impl Detector for FileRuleDetector {
    async fn detect(&self, working_dir: &Path, rules: &[DetectionRule]) -> Result<DetectionResult> {
        if !tokio::fs::try_exists(working_dir).await.unwrap_or(false) {
            return Err(StriderError::Detection(format!(
                "working directory {} does not exist",
                working_dir.display()
            )));
        }

        let mut matches = Vec::new();
        for rule in rules {
            let path = working_dir.join(&rule.filename);
            let present = tokio::fs::try_exists(&path).await.map_err(|e| {
                StriderError::Detection(format!("cannot stat {}: {e}", path.display()))
            })?;
            debug!(rule = %rule.name(), present = present, "evaluated detection rule");
            if present == rule.exists {
                matches.push(DetectionMatch::from(rule));
            }
        }

        info!(matches = matches.len(), "project detection finished");
        Ok(DetectionResult::new(matches))
    }
}
