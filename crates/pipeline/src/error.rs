use sculpt_core::artifact::ArtifactError;
use sculpt_core::error::CoreError;
use sculpt_store::StoreError;
use sculpt_upstream::UpstreamError;

/// Why a job did not reach SUCCESS.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A compare job where no participant produced an artifact.
    #[error("No sculptures could be generated for {0}")]
    NothingGenerated(String),

    #[error("Cancelled")]
    Cancelled,

    /// A progress update violated the record's state machine.
    #[error(transparent)]
    Rejected(#[from] CoreError),
}

/// Errors returned to callers of the submission service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a warming run could not start.
#[derive(Debug, thiserror::Error)]
pub enum WarmingError {
    #[error("Warming run {run_id} is already in progress")]
    AlreadyRunning { run_id: String },

    #[error(transparent)]
    Invalid(#[from] CoreError),
}
