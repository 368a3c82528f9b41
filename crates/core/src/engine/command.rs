//! Command vocabulary issued to the engine.
//!
//! Commands are built as typed values and rendered to the argument list an
//! ffmpeg-compatible engine understands. Global flags (overwrite, log level,
//! progress reporting) are the engine's business and are not part of these
//! argument lists.

use serde::{Deserialize, Serialize};

/// Encoder used for every audio artifact.
pub const MP3_CODEC: &str = "libmp3lame";

/// LAME VBR quality; 0 is the highest.
pub const MP3_VBR_QUALITY: u8 = 0;

/// Sample rate forced when downsampling is requested.
pub const DOWNSAMPLE_RATE_HZ: u32 = 22_050;

/// Range a single `atempo` filter instance accepts.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Speeds closer to 1.0 than this are treated as unchanged.
const SPEED_EPSILON: f64 = 1e-9;

/// Where a concatenation writes its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConcatTarget {
    /// One merged file.
    File { name: String },
    /// Fixed-duration segments named by a printf-style pattern.
    Segments { pattern: String, segment_secs: u32 },
}

/// A command the orchestrator issues to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    /// Strip video, encode audio, optionally resample and change tempo.
    ExtractAudio {
        input: String,
        output: String,
        sample_rate_hz: Option<u32>,
        speed: Option<f64>,
    },
    /// Concatenate the files listed in a manifest with stream copy.
    Concat {
        manifest: String,
        target: ConcatTarget,
    },
}

impl EngineCommand {
    /// Builds an audio extraction command from job options.
    pub fn extract_audio(
        input: impl Into<String>,
        output: impl Into<String>,
        downsample: bool,
        speed: f64,
    ) -> Self {
        Self::ExtractAudio {
            input: input.into(),
            output: output.into(),
            sample_rate_hz: downsample.then_some(DOWNSAMPLE_RATE_HZ),
            speed: ((speed - 1.0).abs() > SPEED_EPSILON).then_some(speed),
        }
    }

    /// Renders the command as an engine argument list.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::ExtractAudio {
                input,
                output,
                sample_rate_hz,
                speed,
            } => {
                let mut args = vec![
                    "-i".to_string(),
                    input.clone(),
                    "-vn".to_string(),
                    "-acodec".to_string(),
                    MP3_CODEC.to_string(),
                    "-q:a".to_string(),
                    MP3_VBR_QUALITY.to_string(),
                ];

                if let Some(rate) = sample_rate_hz {
                    args.extend(["-ar".to_string(), rate.to_string()]);
                }

                if let Some(filter) = speed.and_then(atempo_filter) {
                    args.extend(["-filter:a".to_string(), filter]);
                }

                args.push(output.clone());
                args
            }
            Self::Concat { manifest, target } => {
                let mut args = vec![
                    "-f".to_string(),
                    "concat".to_string(),
                    "-safe".to_string(),
                    "0".to_string(),
                    "-i".to_string(),
                    manifest.clone(),
                    "-c".to_string(),
                    "copy".to_string(),
                ];

                match target {
                    ConcatTarget::File { name } => args.push(name.clone()),
                    ConcatTarget::Segments {
                        pattern,
                        segment_secs,
                    } => args.extend([
                        "-f".to_string(),
                        "segment".to_string(),
                        "-segment_time".to_string(),
                        segment_secs.to_string(),
                        pattern.clone(),
                    ]),
                }

                args
            }
        }
    }
}

/// Builds an `atempo` filter chain for a speed factor.
///
/// A single `atempo` instance only accepts factors in `[0.5, 2.0]`, so larger
/// or smaller factors are split into a product of in-range steps. Returns
/// `None` for a factor of 1.0 or a non-positive factor.
pub fn atempo_filter(speed: f64) -> Option<String> {
    if !speed.is_finite() || speed <= 0.0 || (speed - 1.0).abs() <= SPEED_EPSILON {
        return None;
    }

    let mut factors = Vec::new();
    let mut remaining = speed;
    while remaining > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    factors.push(remaining);

    Some(
        factors
            .iter()
            .map(|f| format!("atempo={}", f))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Builds a concat demuxer manifest, one `file '<name>'` line per entry.
pub fn concat_manifest<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("file '{}'", name.as_ref().replace('\'', r"'\''")))
        .collect::<Vec<_>>()
        .join("\n")
}
