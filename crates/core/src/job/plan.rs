//! Stage planning.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::ConcatTarget;

use super::naming::{
    final_name_single, intermediate_name, MANIFEST_NAME, MERGED_OUTPUT_NAME, SEGMENT_PATTERN,
};
use super::types::{JobSpecification, SplitMode};

/// Which path a job takes through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// One input, no split: transcode straight to the final artifact.
    Single,
    /// Transcode each input to an intermediate, then merge (and maybe split).
    Batch,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Batch => write!(f, "batch"),
        }
    }
}

/// Transcode of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeTask {
    /// Position of the input in the job.
    pub input_index: usize,
    pub input_name: String,
    /// Intermediate name in batch mode, final name in single mode.
    pub output_name: String,
}

/// Concatenation of every intermediate, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeTask {
    pub manifest_name: String,
    pub inputs: Vec<String>,
    pub target: ConcatTarget,
}

impl MergeTask {
    /// Whether the merge writes segments instead of one file.
    pub fn is_segmented(&self) -> bool {
        matches!(self.target, ConcatTarget::Segments { .. })
    }
}

/// Read-only plan derived once from a job specification.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub mode: PipelineMode,
    pub transcodes: Vec<TranscodeTask>,
    /// Present iff `mode` is [`PipelineMode::Batch`].
    pub merge: Option<MergeTask>,
}

impl StagePlan {
    /// Derives the plan for a job. Expects a validated specification.
    pub fn from_spec(spec: &JobSpecification) -> Self {
        let mode = if spec.is_batch() {
            PipelineMode::Batch
        } else {
            PipelineMode::Single
        };

        let transcodes: Vec<TranscodeTask> = spec
            .inputs
            .iter()
            .enumerate()
            .map(|(input_index, input)| TranscodeTask {
                input_index,
                input_name: input.name.clone(),
                output_name: match mode {
                    PipelineMode::Single => final_name_single(&input.name),
                    PipelineMode::Batch => intermediate_name(&input.name),
                },
            })
            .collect();

        let merge = match mode {
            PipelineMode::Single => None,
            PipelineMode::Batch => Some(MergeTask {
                manifest_name: MANIFEST_NAME.to_string(),
                inputs: transcodes.iter().map(|t| t.output_name.clone()).collect(),
                target: match spec.options.split {
                    SplitMode::None => ConcatTarget::File {
                        name: MERGED_OUTPUT_NAME.to_string(),
                    },
                    SplitMode::Fixed { seconds } => ConcatTarget::Segments {
                        pattern: SEGMENT_PATTERN.to_string(),
                        segment_secs: seconds,
                    },
                },
            }),
        };

        Self {
            mode,
            transcodes,
            merge,
        }
    }

    /// Number of weighted stages: one per transcode plus the merge, if any.
    pub fn stage_count(&self) -> usize {
        self.transcodes.len() + usize::from(self.merge.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{InputFile, JobOptions};

    fn spec(names: &[&str], split: SplitMode) -> JobSpecification {
        JobSpecification::new(
            names.iter().map(|n| InputFile::new(*n, Vec::new())).collect(),
            JobOptions {
                split,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_single_plan() {
        let plan = StagePlan::from_spec(&spec(&["a.mp4"], SplitMode::None));

        assert_eq!(plan.mode, PipelineMode::Single);
        assert_eq!(plan.transcodes.len(), 1);
        assert_eq!(plan.transcodes[0].output_name, "a.mp3");
        assert!(plan.merge.is_none());
        assert_eq!(plan.stage_count(), 1);
    }

    #[test]
    fn test_batch_plan_preserves_order() {
        let plan = StagePlan::from_spec(&spec(&["b.mp4", "a.mp4", "c.mkv"], SplitMode::None));

        assert_eq!(plan.mode, PipelineMode::Batch);
        assert_eq!(plan.stage_count(), 4);
        let merge = plan.merge.unwrap();
        assert_eq!(
            merge.inputs,
            vec!["temp_b.mp4.mp3", "temp_a.mp4.mp3", "temp_c.mkv.mp3"]
        );
        assert_eq!(merge.manifest_name, "concat_list.txt");
        assert_eq!(
            merge.target,
            ConcatTarget::File {
                name: "output.mp3".to_string()
            }
        );
    }

    #[test]
    fn test_split_forces_batch_for_single_input() {
        let plan = StagePlan::from_spec(&spec(&["a.mp4"], SplitMode::Fixed { seconds: 30 }));

        assert_eq!(plan.mode, PipelineMode::Batch);
        assert_eq!(plan.transcodes[0].output_name, "temp_a.mp4.mp3");
        let merge = plan.merge.unwrap();
        assert!(merge.is_segmented());
        assert_eq!(
            merge.target,
            ConcatTarget::Segments {
                pattern: "output_%03d.mp3".to_string(),
                segment_secs: 30
            }
        );
    }
}
