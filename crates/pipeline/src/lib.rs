//! Task orchestration for sculpture generation.
//!
//! - [`TaskExecutor`]: runs one job through the three-stage pipeline.
//! - [`SculptureService`]: cache-first submission, polling, cancellation.
//! - [`WarmingScheduler`]: periodic and on-demand cache warming.
//!
//! Supporting pieces: [`TaskReporter`] (progress to store and
//! subscribers), [`CancellationRegistry`], and [`KeyLeases`]
//! (per-fingerprint single-flight), and [`TaskWatch`] (ordered push feed).

pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod lease;
pub mod reporter;
pub mod service;
pub mod warming;
pub mod watch;

pub use cancel::CancellationRegistry;
pub use config::PipelineConfig;
pub use error::{JobError, PipelineError, WarmingError};
pub use executor::{Job, TaskExecutor};
pub use lease::{KeyLeases, Lease};
pub use reporter::TaskReporter;
pub use service::{new_task_id, Enqueued, SculptureService, Submission};
pub use warming::{WarmingConfig, WarmingRequest, WarmingScheduler, WarmingSnapshot};
pub use watch::TaskWatch;
