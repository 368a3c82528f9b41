//! Testing utilities and a mock engine for pipeline tests.
//!
//! This module provides an in-memory implementation of the `Engine` trait,
//! allowing the whole pipeline to be exercised without an ffmpeg binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use audiorip_core::testing::{fixtures, MockEngine};
//!
//! let engine = MockEngine::new();
//! engine.set_segment_count(2).await;
//!
//! let spec = fixtures::split_job(&["a.mp4", "b.mp4"], 30);
//! ```

mod mock_engine;

pub use mock_engine::{MockEngine, RecordedExec};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::job::{InputFile, JobOptions, JobSpecification, SplitMode};

    /// Create an input whose content is derived from its name.
    pub fn video_input(name: &str) -> InputFile {
        InputFile::new(name, format!("video:{}", name).into_bytes())
    }

    /// Create a job over the named inputs with default options.
    pub fn job(names: &[&str]) -> JobSpecification {
        JobSpecification::new(
            names.iter().map(|n| video_input(n)).collect(),
            JobOptions::default(),
        )
    }

    /// Create a job with custom options.
    pub fn job_with_options(names: &[&str], options: JobOptions) -> JobSpecification {
        let mut spec = job(names);
        spec.options = options;
        spec
    }

    /// Create a batch job split into fixed-length segments.
    pub fn split_job(names: &[&str], seconds: u32) -> JobSpecification {
        job_with_options(
            names,
            JobOptions {
                split: SplitMode::Fixed { seconds },
                ..Default::default()
            },
        )
    }
}
