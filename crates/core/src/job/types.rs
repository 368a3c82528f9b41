//! Types for the job module.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::naming::{
    final_name_single, intermediate_name, parse_segment_index, MANIFEST_NAME, MERGED_OUTPUT_NAME,
};

/// Reasons a job specification is rejected before any engine call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    /// No input files.
    #[error("at least one input file is required")]
    NoInputs,

    /// Speed factor is zero, negative or not a number.
    #[error("speed factor must be a positive number, got {0}")]
    InvalidSpeed(f64),

    /// Fixed split with a zero duration.
    #[error("split duration must be greater than 0 seconds")]
    InvalidSplitDuration,

    /// Split mode string could not be parsed.
    #[error("invalid split mode '{0}', expected 'none' or 'fixed:<seconds>'")]
    InvalidSplitMode(String),

    /// Input name cannot be used as a flat file name.
    #[error("invalid input file name '{0}'")]
    InvalidInputName(String),

    /// Two inputs share a name.
    #[error("duplicate input file name '{0}'")]
    DuplicateInput(String),

    /// Input name equals a name the batch path writes.
    #[error("input file name '{0}' is reserved for a file the job writes")]
    ReservedName(String),

    /// The single-file output would overwrite its own input.
    #[error("output name for '{0}' collides with the input name")]
    OutputCollidesWithInput(String),
}

/// How the merged result is split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SplitMode {
    /// Keep the merged result whole.
    #[default]
    None,
    /// Split into segments of a fixed number of seconds.
    Fixed { seconds: u32 },
}

impl SplitMode {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Fixed { seconds } => write!(f, "fixed:{}", seconds),
        }
    }
}

impl FromStr for SplitMode {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }
        trimmed
            .strip_prefix("fixed:")
            .and_then(|secs| secs.trim().parse::<u32>().ok())
            .map(|seconds| Self::Fixed { seconds })
            .ok_or_else(|| SpecError::InvalidSplitMode(s.to_string()))
    }
}

impl TryFrom<String> for SplitMode {
    type Error = SpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SplitMode> for String {
    fn from(mode: SplitMode) -> Self {
        mode.to_string()
    }
}

/// One user-supplied input file.
#[derive(Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Original file name, used verbatim in the engine filesystem.
    pub name: String,
    /// File content.
    pub bytes: Vec<u8>,
    /// Size in bytes.
    pub size: u64,
}

impl InputFile {
    /// Creates an input whose size is the byte length.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self {
            name: name.into(),
            bytes,
            size,
        }
    }
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Options shared by every input of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Tempo factor; 1.0 leaves the audio untouched.
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Force the reduced sample rate.
    #[serde(default)]
    pub downsample: bool,
    /// Split policy for the merged output.
    #[serde(default)]
    pub split: SplitMode,
}

fn default_speed() -> f64 {
    1.0
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            downsample: false,
            split: SplitMode::None,
        }
    }
}

/// One extraction request: the inputs and their shared options.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpecification {
    /// Inputs in caller order; this order is the order of the merged audio.
    pub inputs: Vec<InputFile>,
    pub options: JobOptions,
}

impl JobSpecification {
    pub fn new(inputs: Vec<InputFile>, options: JobOptions) -> Self {
        Self { inputs, options }
    }

    /// Whether the job needs the merge stage.
    pub fn is_batch(&self) -> bool {
        self.inputs.len() > 1 || !self.options.split.is_none()
    }

    /// Checks every invariant a job must satisfy before it may start.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.inputs.is_empty() {
            return Err(SpecError::NoInputs);
        }

        let speed = self.options.speed;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SpecError::InvalidSpeed(speed));
        }

        if let SplitMode::Fixed { seconds: 0 } = self.options.split {
            return Err(SpecError::InvalidSplitDuration);
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !is_valid_name(&input.name) {
                return Err(SpecError::InvalidInputName(input.name.clone()));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(SpecError::DuplicateInput(input.name.clone()));
            }
        }

        if !self.is_batch() {
            let input = &self.inputs[0];
            if final_name_single(&input.name) == input.name {
                return Err(SpecError::OutputCollidesWithInput(input.name.clone()));
            }
            return Ok(());
        }

        let intermediates: HashSet<String> = self
            .inputs
            .iter()
            .map(|input| intermediate_name(&input.name))
            .collect();
        for input in &self.inputs {
            let name = input.name.as_str();
            if intermediates.contains(name)
                || name == MANIFEST_NAME
                || name == MERGED_OUTPUT_NAME
                || parse_segment_index(name).is_some()
            {
                return Err(SpecError::ReservedName(input.name.clone()));
            }
        }

        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.contains(|c: char| c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> InputFile {
        InputFile::new(name, vec![0u8; 16])
    }

    fn spec(names: &[&str], options: JobOptions) -> JobSpecification {
        JobSpecification::new(names.iter().map(|n| input(n)).collect(), options)
    }

    #[test]
    fn test_split_mode_parse_and_display() {
        assert_eq!("none".parse::<SplitMode>().unwrap(), SplitMode::None);
        assert_eq!(
            "fixed:30".parse::<SplitMode>().unwrap(),
            SplitMode::Fixed { seconds: 30 }
        );
        assert_eq!(SplitMode::Fixed { seconds: 600 }.to_string(), "fixed:600");
        assert!(matches!(
            "fixed:-5".parse::<SplitMode>(),
            Err(SpecError::InvalidSplitMode(_))
        ));
        assert!("every:30".parse::<SplitMode>().is_err());
    }

    #[test]
    fn test_split_mode_serde() {
        let options: JobOptions =
            serde_json::from_str(r#"{"speed":1.5,"split":"fixed:45"}"#).unwrap();
        assert_eq!(options.split, SplitMode::Fixed { seconds: 45 });
        assert!(!options.downsample);

        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("\"split\":\"fixed:45\""));
    }

    #[test]
    fn test_input_size_matches_bytes() {
        let file = InputFile::new("a.mp4", vec![1, 2, 3]);
        assert_eq!(file.size, 3);
        assert!(!format!("{:?}", file).contains("bytes"));
    }

    #[test]
    fn test_mode_selection() {
        assert!(!spec(&["a.mp4"], JobOptions::default()).is_batch());
        assert!(spec(&["a.mp4", "b.mp4"], JobOptions::default()).is_batch());

        let split = JobOptions {
            split: SplitMode::Fixed { seconds: 30 },
            ..Default::default()
        };
        assert!(spec(&["a.mp4"], split).is_batch());
    }

    #[test]
    fn test_validate_rejects_empty_inputs() {
        let job = JobSpecification::new(Vec::new(), JobOptions::default());
        assert_eq!(job.validate(), Err(SpecError::NoInputs));
    }

    #[test]
    fn test_validate_rejects_zero_split() {
        let options = JobOptions {
            split: SplitMode::Fixed { seconds: 0 },
            ..Default::default()
        };
        assert_eq!(
            spec(&["a.mp4"], options).validate(),
            Err(SpecError::InvalidSplitDuration)
        );
    }

    #[test]
    fn test_validate_rejects_bad_speed() {
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let options = JobOptions {
                speed,
                ..Default::default()
            };
            assert!(matches!(
                spec(&["a.mp4"], options).validate(),
                Err(SpecError::InvalidSpeed(_))
            ));
        }
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(matches!(
            spec(&["dir/a.mp4"], JobOptions::default()).validate(),
            Err(SpecError::InvalidInputName(_))
        ));
        assert!(matches!(
            spec(&["a.mp4", "a.mp4"], JobOptions::default()).validate(),
            Err(SpecError::DuplicateInput(_))
        ));
        assert!(matches!(
            spec(&["song.mp3"], JobOptions::default()).validate(),
            Err(SpecError::OutputCollidesWithInput(_))
        ));
    }

    #[test]
    fn test_validate_rejects_reserved_names_in_batch() {
        for names in [
            ["a.mp4", "temp_a.mp4.mp3"],
            ["temp_b.mp4.mp3", "b.mp4"],
            ["a.mp4", "concat_list.txt"],
            ["a.mp4", "output.mp3"],
            ["output_001.mp3", "a.mp4"],
        ] {
            assert!(
                matches!(
                    spec(&names, JobOptions::default()).validate(),
                    Err(SpecError::ReservedName(_))
                ),
                "{:?}",
                names
            );
        }

        // Single-file jobs never write those names.
        assert!(spec(&["output_001.mp4"], JobOptions::default())
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_accepts_mp3_input_in_batch() {
        let job = spec(&["song.mp3", "b.mp4"], JobOptions::default());
        assert!(job.validate().is_ok());
    }
}
