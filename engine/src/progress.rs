//! Progress side channel for ingestion runs

/// Receives stage updates while an ingestion runs
///
/// Reporters only observe; nothing they do changes what the ingestor
/// produces.
pub trait ProgressReporter: Send + Sync {
    /// A stage started; `advance` is the share of the run (in percent) it covers
    fn stage(&self, description: &str, advance: u8);

    fn finish(&self, description: &str);
}

/// Reporter that ignores every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn stage(&self, _description: &str, _advance: u8) {}

    fn finish(&self, _description: &str) {}
}
