//! Types for the pipeline module.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::PipelineMode;

/// Lifecycle state of the orchestrator's current job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// No job has run yet.
    Idle,
    /// Validating the specification and planning stages.
    Preparing,
    /// Transcoding one input.
    Transcoding {
        current_file: usize,
        total_files: usize,
        file_name: String,
    },
    /// Concatenating intermediates, optionally into segments.
    Merging { segmented: bool },
    /// Reading final artifacts out and cleaning up.
    Finalizing,
    Completed,
    Failed,
}

impl JobState {
    /// Whether the job has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Update streamed to the job's submitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// Overall progress of the job.
    Progress { percent: u8, label: String },
    /// A line of engine or pipeline log output.
    Log { line: String },
    /// The job moved to a new state.
    State { state: JobState },
}

/// An artifact returned to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct FinalArtifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FinalArtifact {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for FinalArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalArtifact")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Result of a completed job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Path the job took.
    pub mode: PipelineMode,
    /// Final artifacts in output order.
    pub artifacts: Vec<FinalArtifact>,
    /// Wall-clock duration of the job in milliseconds.
    pub elapsed_ms: u64,
}

impl JobOutput {
    pub fn names(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(FinalArtifact::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_event_serialization() {
        let event = JobEvent::Progress {
            percent: 35,
            label: "Transcoding a.mp4 (1/2)".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"progress\""));
        assert!(json.contains("\"percent\":35"));

        let state = JobEvent::State {
            state: JobState::Merging { segmented: true },
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"state\":\"merging\""));
        assert!(json.contains("\"segmented\":true"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Finalizing.is_terminal());
    }

    #[test]
    fn test_output_totals() {
        let output = JobOutput {
            mode: PipelineMode::Batch,
            artifacts: vec![
                FinalArtifact {
                    name: "output_000.mp3".to_string(),
                    bytes: vec![0; 10],
                },
                FinalArtifact {
                    name: "output_001.mp3".to_string(),
                    bytes: vec![0; 5],
                },
            ],
            elapsed_ms: 1,
        };
        assert_eq!(output.names(), vec!["output_000.mp3", "output_001.mp3"]);
        assert_eq!(output.total_bytes(), 15);
    }
}
