//! Build phase definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed stages every job passes through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Pre-test preparation (e.g. `npm install`).
    Prepare,

    /// Run the project's tests.
    Test,

    /// Ship the build to a deploy target.
    Deploy,

    /// Tear-down; always runs and never fails the job.
    Cleanup,
}

/// Execution order of the phases. Not configurable.
pub const PHASES: [Phase; 4] = [Phase::Prepare, Phase::Test, Phase::Deploy, Phase::Cleanup];

impl Phase {
    /// Get the phase name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Test => "test",
            Phase::Deploy => "deploy",
            Phase::Cleanup => "cleanup",
        }
    }

    /// Whether a hook failure in this phase fails the job.
    pub fn can_fail(&self) -> bool {
        !matches!(self, Phase::Cleanup)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepare" => Ok(Phase::Prepare),
            "test" => Ok(Phase::Test),
            "deploy" => Ok(Phase::Deploy),
            "cleanup" => Ok(Phase::Cleanup),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}
