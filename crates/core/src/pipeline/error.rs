//! Error types for the pipeline module.

use thiserror::Error;

use crate::engine::EngineError;
use crate::job::SpecError;

/// Errors that end a job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The job was rejected before any engine interaction.
    #[error("Invalid job specification: {0}")]
    InvalidSpecification(#[from] SpecError),

    /// The engine failed to initialize; the job never started.
    #[error("Transcoding engine could not start: {0}")]
    EngineUnavailable(#[source] EngineError),

    /// An engine invocation failed during a stage.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: EngineError,
    },

    /// Segmentation did not produce the expected segment files.
    #[error("Segmentation failed: {reason}")]
    SegmentationMismatch { reason: String },

    /// Another job is still running on this orchestrator.
    #[error("A job is already in progress")]
    JobInProgress,

    /// The job was cancelled at a stage boundary.
    #[error("Job cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Creates a stage failure for the named stage.
    pub fn stage_failure(stage: impl Into<String>, source: EngineError) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            source,
        }
    }

    /// Creates a segmentation mismatch error.
    pub fn segmentation_mismatch(reason: impl Into<String>) -> Self {
        Self::SegmentationMismatch {
            reason: reason.into(),
        }
    }

    /// Whether this error came from a running stage.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            Self::StageFailure { .. } | Self::SegmentationMismatch { .. }
        )
    }

    /// Short name of the phase the job was in when it failed.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::InvalidSpecification(_) | Self::JobInProgress => "preparing",
            Self::EngineUnavailable(_) => "engine",
            Self::StageFailure { .. } | Self::SegmentationMismatch { .. } => "stage",
            Self::Cancelled => "cancelled",
        }
    }
}
