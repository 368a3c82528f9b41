//! Job module: what one extraction request asks for.
//!
//! A [`JobSpecification`] is pure data. [`StagePlan`] is derived from it once
//! and decides between the single-file path and the batch path; the `naming`
//! functions derive every file name the pipeline writes.

pub mod naming;
mod plan;
mod types;

pub use plan::{MergeTask, PipelineMode, StagePlan, TranscodeTask};
pub use types::{InputFile, JobOptions, JobSpecification, SpecError, SplitMode};
