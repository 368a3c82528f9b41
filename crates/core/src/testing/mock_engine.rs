//! Mock engine for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::engine::{Engine, EngineError, EngineEvent, VfsEntry};

/// A recorded engine invocation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedExec {
    /// Arguments the engine was invoked with.
    pub args: Vec<String>,
    /// Whether the invocation succeeded.
    pub success: bool,
}

impl RecordedExec {
    /// Whether the invocation was a concatenation.
    pub fn is_concat(&self) -> bool {
        self.args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat")
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .windows(2)
            .find(|w| w[0] == flag)
            .map(|w| w[1].as_str())
    }
}

/// Mock implementation of the Engine trait.
///
/// Keeps the virtual filesystem in memory and simulates the two commands the
/// pipeline issues:
/// - audio extraction writes `mp3:` followed by the input bytes to the output
/// - concatenation writes the listed files back to back, either to one file or
///   split evenly across a configurable number of segments
///
/// Failures, progress sequences and delays are controllable.
///
/// # Example
///
/// ```rust,ignore
/// use audiorip_core::testing::MockEngine;
///
/// let engine = MockEngine::new();
/// engine.set_segment_count(4).await;
/// engine.fail_exec_matching("b.mp4").await;
///
/// let orchestrator = PipelineOrchestrator::new(engine.clone());
/// let result = orchestrator.run(spec, None).await;
///
/// assert!(engine.file_names().await.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MockEngine {
    /// Virtual filesystem, in insertion order.
    files: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
    /// Recorded invocations.
    execs: Arc<RwLock<Vec<RecordedExec>>>,
    /// Every name `delete` was called with.
    delete_attempts: Arc<RwLock<Vec<String>>>,
    /// Every name `write` was called with.
    writes: Arc<RwLock<Vec<String>>>,
    /// If set, `validate` fails with this reason.
    unavailable: Arc<RwLock<Option<String>>>,
    /// If set, the next exec fails with this reason.
    next_exec_error: Arc<RwLock<Option<String>>>,
    /// Any exec whose arguments contain one of these fails.
    failing_exec_needles: Arc<RwLock<Vec<String>>>,
    /// Names whose deletion fails with an I/O error.
    failing_deletes: Arc<RwLock<HashSet<String>>>,
    /// Names whose write fails with an I/O error.
    failing_writes: Arc<RwLock<HashSet<String>>>,
    /// Whether a failed exec still leaves its output behind.
    partial_output_on_failure: Arc<RwLock<bool>>,
    /// Number of segments a segmenting concat produces.
    segment_count: Arc<RwLock<usize>>,
    /// Progress fractions emitted by every exec.
    progress_script: Arc<RwLock<Vec<f64>>>,
    /// Simulated duration of every exec.
    exec_delay: Arc<RwLock<Duration>>,
    /// Whether `list` returns entries in reverse insertion order.
    reverse_listing: Arc<RwLock<bool>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine with an empty filesystem.
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(Vec::new())),
            execs: Arc::new(RwLock::new(Vec::new())),
            delete_attempts: Arc::new(RwLock::new(Vec::new())),
            writes: Arc::new(RwLock::new(Vec::new())),
            unavailable: Arc::new(RwLock::new(None)),
            next_exec_error: Arc::new(RwLock::new(None)),
            failing_exec_needles: Arc::new(RwLock::new(Vec::new())),
            failing_deletes: Arc::new(RwLock::new(HashSet::new())),
            failing_writes: Arc::new(RwLock::new(HashSet::new())),
            partial_output_on_failure: Arc::new(RwLock::new(false)),
            segment_count: Arc::new(RwLock::new(3)),
            progress_script: Arc::new(RwLock::new(vec![0.25, 0.5, 0.75, 1.0])),
            exec_delay: Arc::new(RwLock::new(Duration::ZERO)),
            reverse_listing: Arc::new(RwLock::new(false)),
        }
    }

    /// Put a file straight into the filesystem.
    pub async fn insert_file(&self, name: &str, bytes: &[u8]) {
        self.store(name, bytes.to_vec()).await;
    }

    /// Content of a file, if present.
    pub async fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
    }

    /// Whether a file is present.
    pub async fn contains(&self, name: &str) -> bool {
        self.file(name).await.is_some()
    }

    /// Names currently in the filesystem, in insertion order.
    pub async fn file_names(&self) -> Vec<String> {
        self.files
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Get all recorded invocations.
    pub async fn recorded_execs(&self) -> Vec<RecordedExec> {
        self.execs.read().await.clone()
    }

    /// Get the number of invocations performed.
    pub async fn exec_count(&self) -> usize {
        self.execs.read().await.len()
    }

    /// Every name deletion was attempted for.
    pub async fn delete_attempts(&self) -> Vec<String> {
        self.delete_attempts.read().await.clone()
    }

    /// Every name written through `write`.
    pub async fn writes(&self) -> Vec<String> {
        self.writes.read().await.clone()
    }

    /// Make `validate` fail.
    pub async fn set_unavailable(&self, reason: impl Into<String>) {
        *self.unavailable.write().await = Some(reason.into());
    }

    /// Configure the next exec to fail.
    pub async fn set_next_exec_error(&self, reason: impl Into<String>) {
        *self.next_exec_error.write().await = Some(reason.into());
    }

    /// Fail every exec whose arguments contain `needle`.
    pub async fn fail_exec_matching(&self, needle: impl Into<String>) {
        self.failing_exec_needles.write().await.push(needle.into());
    }

    /// Fail deletion of `name`.
    pub async fn fail_delete_of(&self, name: impl Into<String>) {
        self.failing_deletes.write().await.insert(name.into());
    }

    /// Fail writes of `name`.
    pub async fn fail_write_of(&self, name: impl Into<String>) {
        self.failing_writes.write().await.insert(name.into());
    }

    /// Leave outputs behind when an exec fails, like an engine dying mid-write.
    pub async fn set_partial_output_on_failure(&self, partial: bool) {
        *self.partial_output_on_failure.write().await = partial;
    }

    /// Set how many segments a segmenting concat produces.
    pub async fn set_segment_count(&self, count: usize) {
        *self.segment_count.write().await = count;
    }

    /// Set the progress fractions every exec reports.
    pub async fn set_progress_script(&self, fractions: Vec<f64>) {
        *self.progress_script.write().await = fractions;
    }

    /// Set the simulated exec duration.
    pub async fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.write().await = delay;
    }

    /// Return listings in reverse insertion order.
    pub async fn set_reverse_listing(&self, reverse: bool) {
        *self.reverse_listing.write().await = reverse;
    }

    async fn store(&self, name: &str, bytes: Vec<u8>) {
        let mut files = self.files.write().await;
        match files.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = bytes,
            None => files.push((name.to_string(), bytes)),
        }
    }

    async fn exec_error(&self, args: &[String]) -> Option<String> {
        if let Some(reason) = self.next_exec_error.write().await.take() {
            return Some(reason);
        }
        let needles = self.failing_exec_needles.read().await;
        needles
            .iter()
            .find(|needle| args.iter().any(|a| a.contains(needle.as_str())))
            .map(|needle| format!("simulated failure on '{}'", needle))
    }

    /// Computes the files an invocation writes.
    async fn simulate(&self, args: &[String]) -> Result<Vec<(String, Vec<u8>)>, EngineError> {
        let output = args
            .last()
            .ok_or_else(|| EngineError::exec_failed("no output given", None))?;
        let input = args
            .windows(2)
            .find(|w| w[0] == "-i")
            .map(|w| w[1].clone())
            .ok_or_else(|| EngineError::exec_failed("no input given", None))?;
        let input_bytes = self.file(&input).await.ok_or_else(|| {
            EngineError::exec_failed(format!("{}: No such file or directory", input), None)
        })?;

        let is_concat = args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat");
        if !is_concat {
            let mut audio = b"mp3:".to_vec();
            audio.extend_from_slice(&input_bytes);
            return Ok(vec![(output.clone(), audio)]);
        }

        let manifest = String::from_utf8_lossy(&input_bytes).to_string();
        let mut merged = Vec::new();
        for line in manifest.lines() {
            let name = line
                .strip_prefix("file '")
                .and_then(|rest| rest.strip_suffix('\''))
                .map(|name| name.replace(r"'\''", "'"))
                .ok_or_else(|| {
                    EngineError::exec_failed(format!("invalid manifest line: {}", line), None)
                })?;
            let bytes = self.file(&name).await.ok_or_else(|| {
                EngineError::exec_failed(format!("{}: No such file or directory", name), None)
            })?;
            merged.extend_from_slice(&bytes);
        }

        let is_segment = args.windows(2).any(|w| w[0] == "-f" && w[1] == "segment");
        if !is_segment {
            return Ok(vec![(output.clone(), merged)]);
        }

        let count = *self.segment_count.read().await;
        let chunk = merged.len().div_ceil(count.max(1)).max(1);
        Ok((0..count)
            .map(|index| {
                let start = (index * chunk).min(merged.len());
                let end = ((index + 1) * chunk).min(merged.len());
                (
                    output.replace("%03d", &format!("{:03}", index)),
                    merged[start..end].to_vec(),
                )
            })
            .collect())
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self) -> Result<(), EngineError> {
        match self.unavailable.read().await.as_ref() {
            Some(reason) => Err(EngineError::unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.writes.write().await.push(name.to_string());
        if self.failing_writes.read().await.contains(name) {
            return Err(EngineError::Io(std::io::Error::other(format!(
                "simulated write failure for {}",
                name
            ))));
        }
        self.store(name, bytes.to_vec()).await;
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let _ = events
            .send(EngineEvent::log(format!("mock {}", args.join(" "))))
            .await;

        let script = self.progress_script.read().await.clone();
        let delay = *self.exec_delay.read().await;
        let step = delay / (script.len().max(1) as u32);
        for fraction in script {
            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }
            let _ = events.send(EngineEvent::progress(fraction)).await;
        }

        let outcome = self.simulate(args).await;
        let failure = self.exec_error(args).await;

        let result = match (outcome, failure) {
            (Ok(files), None) => {
                for (name, bytes) in files {
                    self.store(&name, bytes).await;
                }
                Ok(())
            }
            (Ok(files), Some(reason)) => {
                if *self.partial_output_on_failure.read().await {
                    for (name, bytes) in files {
                        self.store(&name, bytes).await;
                    }
                }
                let _ = events.send(EngineEvent::log(format!("Error: {}", reason))).await;
                Err(EngineError::exec_failed(reason, None))
            }
            (Err(e), _) => Err(e),
        };

        self.execs.write().await.push(RecordedExec {
            args: args.to_vec(),
            success: result.is_ok(),
        });
        result
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.file(name)
            .await
            .ok_or_else(|| EngineError::not_found(name))
    }

    async fn delete(&self, name: &str) -> Result<(), EngineError> {
        self.delete_attempts.write().await.push(name.to_string());
        if self.failing_deletes.read().await.contains(name) {
            return Err(EngineError::Io(std::io::Error::other(format!(
                "simulated delete failure for {}",
                name
            ))));
        }

        let mut files = self.files.write().await;
        match files.iter().position(|(n, _)| n == name) {
            Some(index) => {
                files.remove(index);
                Ok(())
            }
            None => Err(EngineError::not_found(name)),
        }
    }

    async fn list(&self, dir: &str) -> Result<Vec<VfsEntry>, EngineError> {
        if !(dir.is_empty() || dir == ".") {
            return Err(EngineError::not_found(dir));
        }
        let mut entries: Vec<VfsEntry> = self
            .files
            .read()
            .await
            .iter()
            .map(|(n, _)| VfsEntry::new(n.clone()))
            .collect();
        if *self.reverse_listing.read().await {
            entries.reverse();
        }
        Ok(entries)
    }
}
