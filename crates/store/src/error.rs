use sculpt_core::error::CoreError;

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or failed the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Task not found: {task_id}")]
    NotFound { task_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A task update violated the record's state machine.
    #[error(transparent)]
    Rejected(#[from] CoreError),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
