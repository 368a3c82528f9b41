//! Engine module: the boundary with the transcoding engine.
//!
//! This module provides the `Engine` trait, which models a transcoding engine
//! that owns a private flat virtual filesystem and runs one command at a time,
//! plus `FfmpegEngine`, an implementation that drives the `ffmpeg` binary over
//! a scratch directory.
//!
//! # Example
//!
//! ```ignore
//! use audiorip_core::engine::{Engine, EngineCommand, EngineConfig, FfmpegEngine};
//!
//! let engine = FfmpegEngine::load(EngineConfig::default()).await?;
//!
//! engine.write("clip.mp4", &bytes).await?;
//!
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(64);
//! let command = EngineCommand::extract_audio("clip.mp4", "clip.mp3", false, 1.0);
//! engine.exec(&command.to_args(), events_tx).await?;
//!
//! let audio = engine.read("clip.mp3").await?;
//! engine.shutdown().await?;
//! ```

mod command;
mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use command::{
    atempo_filter, concat_manifest, ConcatTarget, EngineCommand, DOWNSAMPLE_RATE_HZ, MP3_CODEC,
    MP3_VBR_QUALITY,
};
pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::FfmpegEngine;
pub use traits::Engine;
pub use types::{EngineEvent, VfsEntry};
