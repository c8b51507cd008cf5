//! Phase actions contributed by detection rules and build hooks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Serialize, Serializer};
use strider_core::{Phase, RegistrationError};

use crate::context::ExecutionContext;

/// A callback-style action.
///
/// The action does its own process and output handling through the
/// context and resolves to exactly one exit code (0 = success).
#[async_trait]
pub trait CallbackAction: Send + Sync {
    /// Label used in logs and in the detection summary.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &ExecutionContext) -> i32;
}

type BoxedFn = Box<dyn Fn(ExecutionContext) -> BoxFuture<'static, i32> + Send + Sync>;

/// A [`CallbackAction`] built from a closure.
pub struct FnAction {
    name: String,
    f: BoxedFn,
}

impl FnAction {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = i32> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(move |ctx| f(ctx).boxed()),
        }
    }
}

#[async_trait]
impl CallbackAction for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &ExecutionContext) -> i32 {
        (self.f)(ctx.clone()).await
    }
}

/// One phase entry: a shell command or a callback.
#[derive(Clone)]
pub enum Action {
    Shell(String),
    Callback(Arc<dyn CallbackAction>),
}

impl Action {
    /// A shell command run through `sh -c` in the working copy.
    pub fn shell(command: impl Into<String>) -> Self {
        Action::Shell(command.into())
    }

    pub fn callback<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = i32> + Send + 'static,
    {
        Action::Callback(Arc::new(FnAction::new(name, f)))
    }

    /// Short human-readable description.
    pub fn describe(&self) -> String {
        match self {
            Action::Shell(cmd) => cmd.clone(),
            Action::Callback(cb) => format!("callback:{}", cb.name()),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shell(cmd) => f.debug_tuple("Shell").field(cmd).finish(),
            Action::Callback(cb) => f.debug_tuple("Callback").field(&cb.name()).finish(),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.describe())
    }
}

/// Optional action per phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseActions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepare: Option<Action>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<Action>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<Action>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<Action>,
}

impl PhaseActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The action for `phase`, if one is defined.
    pub fn get(&self, phase: Phase) -> Option<&Action> {
        match phase {
            Phase::Prepare => self.prepare.as_ref(),
            Phase::Test => self.test.as_ref(),
            Phase::Deploy => self.deploy.as_ref(),
            Phase::Cleanup => self.cleanup.as_ref(),
        }
    }

    /// Set the action for `phase`, replacing any previous one.
    pub fn with(mut self, phase: Phase, action: Action) -> Self {
        let slot = match phase {
            Phase::Prepare => &mut self.prepare,
            Phase::Test => &mut self.test,
            Phase::Deploy => &mut self.deploy,
            Phase::Cleanup => &mut self.cleanup,
        };
        *slot = Some(action);
        self
    }

    /// Reject blank shell commands.
    pub fn validate(&self, source_name: &str) -> Result<(), RegistrationError> {
        for phase in strider_core::PHASES {
            if let Some(Action::Shell(cmd)) = self.get(phase) {
                if cmd.trim().is_empty() {
                    return Err(RegistrationError::EmptyAction {
                        source_name: source_name.to_string(),
                        phase: phase.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
