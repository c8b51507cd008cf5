//! Detection rules and build hooks, registered before the queue starts.
//!
//! Registration prepends: the most recent registration is evaluated first.
//! A batch keeps its own internal order and goes in front of everything
//! registered before it. Once built, the registry is shared read-only
//! behind an `Arc`.

use serde::Serialize;
use strider_core::{HookConfig, Phase, RegistrationError, RuleConfig, WorkerConfig};
use tracing::debug;

use crate::action::{Action, PhaseActions};
use crate::context::NODE_PACKAGE_CMD;
use crate::hook::HookSource;

/// A detection rule selected by the presence (or absence) of one file.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRule {
    pub filename: String,

    /// Match when the file exists (`true`) or is missing (`false`).
    pub exists: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,

    #[serde(flatten)]
    pub actions: PhaseActions,

    /// Command that starts the project; informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
}

impl DetectionRule {
    /// A rule matching when `filename` exists at the repository root.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            exists: true,
            language: None,
            framework: None,
            actions: PhaseActions::new(),
            start: None,
        }
    }

    /// Match when the file is absent instead.
    pub fn absent(mut self) -> Self {
        self.exists = false;
        self
    }

    /// Set the reported language.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the reported framework.
    pub fn framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with(mut self, phase: Phase, action: Action) -> Self {
        self.actions = self.actions.with(phase, action);
        self
    }

    /// Record the command that starts the app.
    pub fn start(mut self, command: impl Into<String>) -> Self {
        self.start = Some(command.into());
        self
    }

    /// Name used in logs: the language if set, else the filename.
    pub fn name(&self) -> &str {
        self.language.as_deref().unwrap_or(&self.filename)
    }

    /// The built-in Node.js rule.
    pub fn node() -> Self {
        DetectionRule::new("package.json")
            .language("node.js")
            .with(Phase::Prepare, Action::shell(format!("{NODE_PACKAGE_CMD} install")))
            .with(Phase::Test, Action::shell(format!("{NODE_PACKAGE_CMD} test")))
            .start(format!("{NODE_PACKAGE_CMD} start"))
    }

    pub fn from_config(config: &RuleConfig) -> Self {
        let mut rule = DetectionRule::new(config.filename.clone());
        rule.exists = config.exists;
        rule.language = config.language.clone();
        rule.framework = config.framework.clone();
        rule.actions = shell_actions(&[
            (Phase::Prepare, &config.prepare),
            (Phase::Test, &config.test),
            (Phase::Deploy, &config.deploy),
        ]);
        rule.start = config.start.clone();
        rule
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.filename.trim().is_empty() {
            return Err(RegistrationError::EmptyFilename {
                source_name: self.name().to_string(),
            });
        }
        if self.actions.cleanup.is_some() {
            return Err(RegistrationError::UnknownPhase {
                source_name: self.name().to_string(),
                phase: Phase::Cleanup.name().to_string(),
            });
        }
        self.actions.validate(self.name())
    }
}

/// A statically registered set of phase actions that applies to every job.
#[derive(Debug, Clone, Serialize)]
pub struct BuildHook {
    pub name: String,

    #[serde(flatten)]
    pub actions: PhaseActions,
}

impl BuildHook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: PhaseActions::new(),
        }
    }

    pub fn with(mut self, phase: Phase, action: Action) -> Self {
        self.actions = self.actions.with(phase, action);
        self
    }

    pub fn from_config(config: &HookConfig) -> Self {
        Self {
            name: config.name.clone(),
            actions: shell_actions(&[
                (Phase::Prepare, &config.prepare),
                (Phase::Test, &config.test),
                (Phase::Deploy, &config.deploy),
                (Phase::Cleanup, &config.cleanup),
            ]),
        }
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        self.actions.validate(&self.name)
    }
}

impl HookSource for BuildHook {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> &PhaseActions {
        &self.actions
    }
}

fn shell_actions(entries: &[(Phase, &Option<String>)]) -> PhaseActions {
    entries
        .iter()
        .fold(PhaseActions::new(), |actions, (phase, command)| match command {
            Some(cmd) => actions.with(*phase, Action::shell(cmd.clone())),
            None => actions,
        })
}

/// Detection rules and build hooks in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    rules: Vec<DetectionRule>,
    hooks: Vec<BuildHook>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the built-in Node.js rule.
    pub fn with_defaults() -> Self {
        Self {
            rules: vec![DetectionRule::node()],
            hooks: Vec::new(),
        }
    }

    /// Defaults plus everything declared in the worker configuration.
    ///
    /// Configured rules and hooks are registered as one batch each, so
    /// their file order is their evaluation order.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, RegistrationError> {
        let mut registry = Self::with_defaults();
        registry.add_detection_rules(config.detection_rules.iter().map(DetectionRule::from_config).collect())?;
        registry.add_build_hooks(config.build_hooks.iter().map(BuildHook::from_config).collect())?;
        Ok(registry)
    }

    pub fn add_detection_rule(&mut self, rule: DetectionRule) -> Result<(), RegistrationError> {
        self.add_detection_rules(vec![rule])
    }

    pub fn add_detection_rules(&mut self, rules: Vec<DetectionRule>) -> Result<(), RegistrationError> {
        for rule in &rules {
            rule.validate()?;
            debug!(rule = %rule.name(), filename = %rule.filename, "registering detection rule");
        }
        self.rules.splice(0..0, rules);
        Ok(())
    }

    pub fn add_build_hook(&mut self, hook: BuildHook) -> Result<(), RegistrationError> {
        self.add_build_hooks(vec![hook])
    }

    pub fn add_build_hooks(&mut self, hooks: Vec<BuildHook>) -> Result<(), RegistrationError> {
        for hook in &hooks {
            hook.validate()?;
            debug!(hook = %hook.name, "registering build hook");
        }
        self.hooks.splice(0..0, hooks);
        Ok(())
    }

    /// Detection rules in evaluation order.
    pub fn detection_rules(&self) -> &[DetectionRule] {
        &self.rules
    }

    /// Build hooks in evaluation order.
    pub fn build_hooks(&self) -> &[BuildHook] {
        &self.hooks
    }
}
