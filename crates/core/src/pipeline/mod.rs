//! Pipeline module: runs a job against an engine.
//!
//! The [`PipelineOrchestrator`] drives one job at a time through its stages,
//! reports weighted progress through a [`ProgressAggregator`], and guarantees
//! through a [`CleanupCoordinator`] that nothing the job wrote is left in the
//! engine filesystem when `run` returns.
//!
//! # Example
//!
//! ```ignore
//! use audiorip_core::job::{InputFile, JobOptions, JobSpecification};
//! use audiorip_core::pipeline::{JobEvent, PipelineOrchestrator};
//!
//! let orchestrator = PipelineOrchestrator::new(engine);
//! let (tx, mut rx) = tokio::sync::mpsc::channel(100);
//!
//! tokio::spawn(async move {
//!     while let Some(JobEvent::Progress { percent, label }) = rx.recv().await {
//!         println!("{}% {}", percent, label);
//!     }
//! });
//!
//! let spec = JobSpecification::new(inputs, JobOptions::default());
//! let output = orchestrator.run(spec, Some(tx)).await?;
//! ```

mod cleanup;
mod error;
mod orchestrator;
mod progress;
mod stages;
mod types;

pub use cleanup::{CleanupCoordinator, CleanupReport};
pub use error::PipelineError;
pub use orchestrator::PipelineOrchestrator;
pub use progress::{ProgressAggregator, MERGE_SHARE, TRANSCODE_SHARE};
pub use types::{FinalArtifact, JobEvent, JobOutput, JobState};
