//! Domain models for the Strider worker.
//!
//! - `Job`: one build request with its repo and deploy configuration
//! - `Phase`: the fixed prepare/test/deploy/cleanup sequence
//! - `StriderError`: the error taxonomy

pub mod error;
pub mod job;
pub mod phase;

pub use error::{RegistrationError, Result, StriderError};
pub use job::{DeployConfig, Job, RepoConfig};
pub use phase::{Phase, PHASES};
