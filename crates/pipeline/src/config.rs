/// Worker-pool settings shared by user and warming jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Executor runs allowed at once; further jobs wait PENDING.
    pub max_concurrent_jobs: usize,
    /// Take a per-fingerprint lease on the user path too, so a duplicate
    /// request joins the running task instead of starting another.
    pub strict_single_flight: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            strict_single_flight: false,
        }
    }
}
