//! FFmpeg-based engine implementation.
//!
//! The virtual filesystem is a private scratch directory under the configured
//! work directory. Every command runs with that directory as its working
//! directory, so the flat names used by the pipeline resolve inside it.

use async_trait::async_trait;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::Engine;
use super::types::{EngineEvent, VfsEntry};

/// FFmpeg-based engine implementation.
pub struct FfmpegEngine {
    config: EngineConfig,
    root: PathBuf,
}

impl FfmpegEngine {
    /// Creates a new engine with its own scratch directory under `work_dir`.
    ///
    /// Nothing touches the disk until [`Engine::validate`] runs.
    pub fn new(config: EngineConfig) -> Self {
        let root = config.work_dir.join(Uuid::new_v4().to_string());
        Self { config, root }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Creates an engine and checks that it can run.
    pub async fn load(config: EngineConfig) -> Result<Self, EngineError> {
        let engine = Self::new(config);
        engine.validate().await?;
        Ok(engine)
    }

    /// Scratch directory backing the virtual filesystem.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes the scratch directory and everything left in it.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    async fn prepare_root(&self) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            EngineError::unavailable(format!(
                "cannot create scratch directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    /// Maps a flat virtual filesystem name onto the scratch directory.
    fn resolve(&self, name: &str) -> Result<PathBuf, EngineError> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0');
        if invalid {
            return Err(EngineError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.root.join(name))
    }

    /// Prefixes a command with the global flags every invocation needs.
    fn build_args(&self, args: &[String]) -> Vec<String> {
        let mut full = vec![
            "-y".to_string(), // Overwrite output
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        full.extend(self.config.extra_ffmpeg_args.iter().cloned());
        full.extend(args.iter().cloned());
        full
    }

    /// Parses an input duration line like `Duration: 00:01:02.50, start: ...`.
    fn parse_duration(re: &Regex, line: &str) -> Option<f64> {
        let caps = re.captures(line)?;
        let hours = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let minutes = caps.get(2)?.as_str().parse::<f64>().ok()?;
        let seconds = caps.get(3)?.as_str().parse::<f64>().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    /// Parses a `-progress` output time in seconds.
    fn parse_out_time(re: &Regex, line: &str) -> Option<f64> {
        let caps = re.captures(line)?;
        // Both keys carry microseconds.
        let micros = caps.get(1)?.as_str().parse::<f64>().ok()?;
        Some(micros / 1_000_000.0)
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn validate(&self) -> Result<(), EngineError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::unavailable(format!(
                "ffmpeg -version exited with code: {:?}",
                output.status.code()
            )));
        }

        self.prepare_root().await
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let full_args = self.build_args(args);
        debug!(args = ?full_args, "Spawning ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&full_args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::exec_failed("stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr);

        let duration_regex = Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok();
        let time_regex = Regex::new(r"^out_time_(?:ms|us)=(\d+)$").ok();
        let progress_key_regex = Regex::new(r"^[a-z0-9_]+=\S*$").ok();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut total_secs: Option<f64> = None;
            let mut error_output = String::new();

            // Metadata echoed by ffmpeg is not always UTF-8.
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();

                if total_secs.is_none() {
                    if let Some(ref re) = duration_regex {
                        total_secs = Self::parse_duration(re, &line).filter(|d| *d > 0.0);
                    }
                }

                if let Some(ref re) = time_regex {
                    if let Some(secs) = Self::parse_out_time(re, &line) {
                        if let Some(total) = total_secs {
                            let _ = events.send(EngineEvent::progress(secs / total)).await;
                        }
                        continue;
                    }
                }

                // Remaining key=value lines belong to the -progress block.
                if progress_key_regex.as_ref().is_some_and(|re| re.is_match(&line)) {
                    continue;
                }

                if line.contains("Error") || line.contains("error") {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }

                let _ = events.send(EngineEvent::log(line)).await;
            }

            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(EngineError::exec_failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::Io(e)),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out ffmpeg");
                }
                Err(EngineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        }
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::not_found(name)
            } else {
                EngineError::Io(e)
            }
        })
    }

    async fn delete(&self, name: &str) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::not_found(name)
            } else {
                EngineError::Io(e)
            }
        })
    }

    async fn list(&self, dir: &str) -> Result<Vec<VfsEntry>, EngineError> {
        let path = if dir.is_empty() || dir == "." {
            self.root.clone()
        } else {
            self.resolve(dir)?
        };

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                entries.push(VfsEntry::new(entry.file_name().to_string_lossy()));
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir) -> FfmpegEngine {
        FfmpegEngine::new(EngineConfig::default().with_work_dir(dir.path().to_path_buf()))
    }

    #[test]
    fn test_build_args_prefixes_global_flags() {
        let mut config = EngineConfig::default();
        config.extra_ffmpeg_args = vec!["-threads".to_string(), "2".to_string()];
        let engine = FfmpegEngine::new(config);

        let args = engine.build_args(&["-i".to_string(), "a.mp4".to_string()]);

        assert_eq!(args[0], "-y");
        assert!(args.windows(2).any(|w| w == ["-progress", "pipe:2"]));
        assert!(args.windows(2).any(|w| w == ["-loglevel", "info"]));
        let threads = args.iter().position(|a| a == "-threads").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(threads < input);
        assert_eq!(args.last().map(String::as_str), Some("a.mp4"));
    }

    #[test]
    fn test_parse_duration() {
        let re = Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap();
        let line = "  Duration: 01:02:03.50, start: 0.000000, bitrate: 1411 kb/s";
        let secs = FfmpegEngine::parse_duration(&re, line).unwrap();
        assert!((secs - 3723.5).abs() < 0.001);

        assert!(FfmpegEngine::parse_duration(&re, "  Duration: N/A, bitrate: N/A").is_none());
    }

    #[test]
    fn test_parse_out_time() {
        let re = Regex::new(r"^out_time_(?:ms|us)=(\d+)$").unwrap();
        let secs = FfmpegEngine::parse_out_time(&re, "out_time_ms=12500000").unwrap();
        assert!((secs - 12.5).abs() < 0.001);
        assert!(FfmpegEngine::parse_out_time(&re, "out_time=00:00:12.500000").is_none());
    }

    #[test]
    fn test_resolve_rejects_paths() {
        let engine = FfmpegEngine::with_defaults();
        assert!(engine.resolve("a.mp4").is_ok());
        assert!(matches!(
            engine.resolve("../a.mp4"),
            Err(EngineError::InvalidName { .. })
        ));
        assert!(engine.resolve("dir\\a.mp4").is_err());
        assert!(engine.resolve("").is_err());
        assert!(engine.resolve("..").is_err());
    }

    #[tokio::test]
    async fn test_virtual_filesystem_roundtrip() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.prepare_root().await.unwrap();

        engine.write("a.mp4", b"video").await.unwrap();
        assert_eq!(engine.read("a.mp4").await.unwrap(), b"video");

        let names: Vec<String> = engine
            .list(".")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.mp4".to_string()]);
        assert!(engine.exists("a.mp4").await.unwrap());

        engine.delete("a.mp4").await.unwrap();
        let err = engine.delete("a.mp4").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(engine.read("a.mp4").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_shutdown_removes_scratch_dir() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.prepare_root().await.unwrap();
        engine.write("leftover.mp3", b"x").await.unwrap();

        let root = engine.root().to_path_buf();
        assert!(root.exists());
        engine.shutdown().await.unwrap();
        assert!(!root.exists());
    }

    /// Writes an executable shell script standing in for ffmpeg.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_survives_non_utf8_output() {
        let dir = TempDir::new().unwrap();
        let script = fake_ffmpeg(
            &dir,
            r"printf '  Duration: 00:00:10.00, start: 0.000000\n    title : Caf\351\nout_time_ms=5000000\n' >&2
exit 0",
        );
        let config = EngineConfig::with_ffmpeg_path(script).with_work_dir(dir.path().join("work"));
        let engine = FfmpegEngine::new(config);
        engine.prepare_root().await.unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        engine.exec(&["-i".to_string(), "a.mp4".to_string()], tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(events.contains(&EngineEvent::log("    title : Caf\u{FFFD}")));
        assert!(events.contains(&EngineEvent::progress(0.5)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_failure_keeps_error_lines() {
        let dir = TempDir::new().unwrap();
        let script = fake_ffmpeg(&dir, "echo 'a.mp4: Invalid data found when processing input' >&2\necho 'Error opening input files' >&2\nexit 1");
        let config = EngineConfig::with_ffmpeg_path(script).with_work_dir(dir.path().join("work"));
        let engine = FfmpegEngine::new(config);
        engine.prepare_root().await.unwrap();

        let (tx, _rx) = mpsc::channel(64);
        let err = engine.exec(&[], tx).await.unwrap_err();

        match err {
            EngineError::ExecFailed { stderr, .. } => {
                assert!(stderr.unwrap().contains("Error opening input files"));
            }
            other => panic!("expected ExecFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::with_ffmpeg_path(PathBuf::from("/nonexistent/ffmpeg"))
            .with_work_dir(dir.path().to_path_buf());

        let result = FfmpegEngine::load(config).await;
        assert!(matches!(result, Err(EngineError::FfmpegNotFound { .. })));
    }
}
