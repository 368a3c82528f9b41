use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::EngineConfig;
use crate::job::JobOptions;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Default options for jobs; command-line flags override them.
    #[serde(default)]
    pub job: JobOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where final artifacts are written
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
