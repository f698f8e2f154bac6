use thiserror::Error;

/// Fatal pipeline failures.
///
/// Per-frame task failures are deliberately NOT part of this enum: they are
/// isolated, collected as plain messages by the worker pool, and never abort
/// the job on their own.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed job input (bad background spec, non-positive scene range).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Background image could not be fetched or decoded.
    #[error("background unavailable: {0}")]
    ResourceUnavailable(String),

    /// Frame extraction produced nothing, or the extraction tool failed.
    #[error("frame extraction failed: {0}")]
    ExtractionFailed(String),

    /// A worker failed to construct its segmentation session.
    #[error("worker initialization failed: {0}")]
    WorkerInit(String),

    /// Composite count still short of the frame count after gap-filling.
    #[error("incomplete output: {0}")]
    IncompleteOutput(String),

    /// Remux tool failed, timed out, or produced no output file.
    #[error("remux failed: {0}")]
    MuxFailed(String),
}
