pub mod config;
pub mod engine;
pub mod job;
pub mod pipeline;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, OutputConfig,
};
pub use engine::{Engine, EngineConfig, EngineError, EngineEvent, FfmpegEngine};
pub use job::{InputFile, JobOptions, JobSpecification, SpecError, SplitMode};
pub use pipeline::{
    FinalArtifact, JobEvent, JobOutput, JobState, PipelineError, PipelineOrchestrator,
};
