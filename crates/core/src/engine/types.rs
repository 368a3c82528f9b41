//! Types for the engine module.

use serde::{Deserialize, Serialize};

/// Side-channel event emitted while an engine command runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// One line of engine log output.
    Log { line: String },
    /// Fraction of the running command completed, in [0, 1].
    Progress { fraction: f64 },
}

impl EngineEvent {
    /// Creates a log event.
    pub fn log(line: impl Into<String>) -> Self {
        Self::Log { line: line.into() }
    }

    /// Creates a progress event, clamping the fraction into [0, 1].
    pub fn progress(fraction: f64) -> Self {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        Self::Progress { fraction }
    }
}

/// An entry in the engine's virtual filesystem listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsEntry {
    /// File name, relative to the listed directory.
    pub name: String,
}

impl VfsEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
