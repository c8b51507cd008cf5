//! Strider Core Library
//!
//! Shared building blocks for the Strider worker: job and phase domain
//! types, status events and sinks, configuration, tracing setup and
//! lifecycle observability.

pub mod config;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod obs;
pub mod telemetry;

pub use config::{HookConfig, RuleConfig, WorkerConfig};
pub use domain::{
    DeployConfig, Job, Phase, RegistrationError, RepoConfig, Result, StriderError, PHASES,
};
pub use events::{EventSink, JobUpdate, NullSink, StatusEvent, StatusPayload};
pub use metrics::METRICS;
pub use obs::{
    emit_hook_failed, emit_job_aborted, emit_job_completed, emit_job_started,
    emit_phase_finished, job_span,
};
pub use telemetry::{init_tracing, parse_level};

/// Strider worker version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Marker variable set on every spawned process.
pub const PLATFORM_ENV_VAR: &str = "PAAS_NAME";

/// Value of [`PLATFORM_ENV_VAR`].
pub const PLATFORM_NAME: &str = "strider";
