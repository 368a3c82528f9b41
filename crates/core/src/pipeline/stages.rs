//! Transcode and merge stages.
//!
//! A [`JobContext`] holds everything one job owns while it runs: the progress
//! aggregator, the cleanup set and the event sink. Each stage registers every
//! name before the engine call that may create it.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{concat_manifest, ConcatTarget, Engine, EngineCommand, EngineError, EngineEvent};
use crate::job::naming::parse_segment_index;
use crate::job::{InputFile, JobOptions, MergeTask, TranscodeTask};

use super::cleanup::CleanupCoordinator;
use super::error::PipelineError;
use super::progress::ProgressAggregator;
use super::types::{FinalArtifact, JobEvent, JobState};

/// Buffer for engine events of one invocation.
const ENGINE_EVENT_BUFFER: usize = 64;

/// Stage name used in errors raised while reading final artifacts.
const FINALIZE_STAGE: &str = "finalize";

/// Sends job events to the submitter, if there is one.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<JobEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<mpsc::Sender<JobEvent>>) -> Self {
        Self { tx }
    }

    async fn emit(&self, event: JobEvent) {
        if let Some(ref tx) = self.tx {
            // A submitter that stopped listening does not stop the job.
            let _ = tx.send(event).await;
        }
    }

    pub(crate) async fn progress(&self, percent: u8, label: impl Into<String>) {
        self.emit(JobEvent::Progress {
            percent,
            label: label.into(),
        })
        .await;
    }

    pub(crate) async fn log(&self, line: impl Into<String>) {
        self.emit(JobEvent::Log { line: line.into() }).await;
    }

    pub(crate) async fn state(&self, state: JobState) {
        self.emit(JobEvent::State { state }).await;
    }
}

/// State owned by one running job.
pub(crate) struct JobContext<'a, E: Engine + ?Sized> {
    engine: &'a E,
    options: &'a JobOptions,
    pub(crate) progress: ProgressAggregator,
    pub(crate) cleanup: CleanupCoordinator,
    pub(crate) sink: EventSink,
}

impl<'a, E: Engine + ?Sized> JobContext<'a, E> {
    pub(crate) fn new(
        engine: &'a E,
        options: &'a JobOptions,
        progress: ProgressAggregator,
        sink: EventSink,
    ) -> Self {
        Self {
            engine,
            options,
            progress,
            cleanup: CleanupCoordinator::new(),
            sink,
        }
    }

    /// Runs one engine command, mapping its progress through the aggregator.
    ///
    /// The event channel is created per invocation, so only the current
    /// stage's events are ever mapped.
    async fn exec_with_progress(&mut self, args: Vec<String>, label: &str) -> Result<(), EngineError> {
        let (tx, mut rx) = mpsc::channel(ENGINE_EVENT_BUFFER);
        let engine = self.engine;
        let progress = &mut self.progress;
        let sink = &self.sink;

        let exec = engine.exec(&args, tx);
        let forward = async {
            let mut last = progress.percent();
            while let Some(event) = rx.recv().await {
                match event {
                    EngineEvent::Log { line } => sink.log(line).await,
                    EngineEvent::Progress { fraction } => {
                        let percent = progress.report_current(fraction);
                        if percent != last {
                            last = percent;
                            sink.progress(percent, label).await;
                        }
                    }
                }
            }
        };

        let (result, ()) = tokio::join!(exec, forward);
        result
    }

    async fn begin_stage(&mut self, stage: usize, label: &str) {
        let percent = self.progress.begin_stage(stage);
        self.sink.progress(percent, label).await;
    }

    async fn complete_stage(&mut self, label: &str) {
        let percent = self.progress.complete_current();
        self.sink.progress(percent, label).await;
    }

    /// Transcodes one input to its intermediate or final name.
    pub(crate) async fn transcode(
        &mut self,
        task: &TranscodeTask,
        input: &InputFile,
        total: usize,
    ) -> Result<(), PipelineError> {
        let stage = format!("transcode {}", task.input_name);
        let label = format!(
            "Transcoding {} ({}/{})",
            task.input_name,
            task.input_index + 1,
            total
        );
        info!("{}", label);
        self.begin_stage(task.input_index, &label).await;

        self.cleanup.register(&task.input_name);
        self.engine
            .write(&task.input_name, &input.bytes)
            .await
            .map_err(|e| PipelineError::stage_failure(&stage, e))?;

        let command = EngineCommand::extract_audio(
            &task.input_name,
            &task.output_name,
            self.options.downsample,
            self.options.speed,
        );
        debug!("Issuing {:?}", command);

        self.cleanup.register(&task.output_name);
        self.exec_with_progress(command.to_args(), &label)
            .await
            .map_err(|e| PipelineError::stage_failure(&stage, e))?;

        let created = self
            .engine
            .exists(&task.output_name)
            .await
            .map_err(|e| PipelineError::stage_failure(&stage, e))?;
        if !created {
            return Err(PipelineError::stage_failure(
                &stage,
                EngineError::exec_failed(format!("{} was not created", task.output_name), None),
            ));
        }

        self.cleanup
            .release(self.engine, &task.input_name)
            .await
            .map_err(|e| PipelineError::stage_failure(&stage, e))?;

        self.complete_stage(&label).await;
        Ok(())
    }

    /// Concatenates the intermediates and returns the final names in order.
    pub(crate) async fn merge(&mut self, task: &MergeTask) -> Result<Vec<String>, PipelineError> {
        let stage = "merge";
        let label = if task.is_segmented() {
            "Segmenting"
        } else {
            "Merging"
        };
        info!("{} {} intermediate files", label, task.inputs.len());
        let merge_stage = self.progress.stage_count().saturating_sub(1);
        self.begin_stage(merge_stage, label).await;

        // Segments are discovered by listing, so none may exist beforehand.
        if task.is_segmented() {
            let stale = self
                .list_segments()
                .await
                .map_err(|e| PipelineError::stage_failure(stage, e))?;
            if let Some((_, name)) = stale.first() {
                return Err(PipelineError::segmentation_mismatch(format!(
                    "{} already exists in the engine filesystem",
                    name
                )));
            }
        }

        let manifest = concat_manifest(&task.inputs);
        self.cleanup.register(&task.manifest_name);
        self.engine
            .write(&task.manifest_name, manifest.as_bytes())
            .await
            .map_err(|e| PipelineError::stage_failure(stage, e))?;

        if let ConcatTarget::File { ref name } = task.target {
            self.cleanup.register(name);
        }

        let command = EngineCommand::Concat {
            manifest: task.manifest_name.clone(),
            target: task.target.clone(),
        };
        debug!("Issuing {:?}", command);
        let exec_result = self.exec_with_progress(command.to_args(), label).await;

        let finals = match &task.target {
            ConcatTarget::File { name } => {
                exec_result.map_err(|e| PipelineError::stage_failure(stage, e))?;
                let created = self
                    .engine
                    .exists(name)
                    .await
                    .map_err(|e| PipelineError::stage_failure(stage, e))?;
                if !created {
                    return Err(PipelineError::stage_failure(
                        stage,
                        EngineError::exec_failed(format!("{} was not created", name), None),
                    ));
                }
                vec![name.clone()]
            }
            ConcatTarget::Segments { .. } => {
                // Segment names are only known once the engine has run, so
                // whatever it produced is registered before anything else.
                let segments = match self.register_segments().await {
                    Ok(segments) => segments,
                    Err(e) => {
                        exec_result.map_err(|e| PipelineError::stage_failure(stage, e))?;
                        return Err(PipelineError::stage_failure(stage, e));
                    }
                };
                exec_result.map_err(|e| PipelineError::stage_failure(stage, e))?;
                check_contiguous(&segments)?;
                segments.into_iter().map(|(_, name)| name).collect()
            }
        };

        self.complete_stage(label).await;
        Ok(finals)
    }

    /// Lists the engine filesystem and registers every segment found,
    /// returning them sorted by index.
    async fn register_segments(&mut self) -> Result<Vec<(usize, String)>, EngineError> {
        let segments = self.list_segments().await?;
        for (_, name) in &segments {
            self.cleanup.register(name);
        }
        Ok(segments)
    }

    /// Segment files currently in the engine filesystem, sorted by index.
    async fn list_segments(&self) -> Result<Vec<(usize, String)>, EngineError> {
        let mut segments: Vec<(usize, String)> = self
            .engine
            .list(".")
            .await?
            .into_iter()
            .filter_map(|entry| parse_segment_index(&entry.name).map(|index| (index, entry.name)))
            .collect();
        segments.sort();
        Ok(segments)
    }

    /// Reads every final artifact into memory and removes it from the engine.
    pub(crate) async fn collect(&mut self, names: &[String]) -> Result<Vec<FinalArtifact>, PipelineError> {
        let mut artifacts = Vec::with_capacity(names.len());

        for name in names {
            let bytes = self
                .engine
                .read(name)
                .await
                .map_err(|e| PipelineError::stage_failure(FINALIZE_STAGE, e))?;

            if let Err(e) = self.cleanup.release(self.engine, name).await {
                warn!("Failed to remove final artifact {} after reading: {}", name, e);
            }

            debug!("Collected {} ({} bytes)", name, bytes.len());
            artifacts.push(FinalArtifact {
                name: name.clone(),
                bytes,
            });
        }

        Ok(artifacts)
    }
}

/// Segments must be exactly `0..n`.
fn check_contiguous(segments: &[(usize, String)]) -> Result<(), PipelineError> {
    if segments.is_empty() {
        return Err(PipelineError::segmentation_mismatch(
            "engine produced no files matching the segment pattern",
        ));
    }

    for (expected, (index, name)) in segments.iter().enumerate() {
        if *index != expected {
            return Err(PipelineError::segmentation_mismatch(format!(
                "expected segment {} but found {}",
                expected, name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: usize) -> (usize, String) {
        (index, crate::job::naming::segment_name(index))
    }

    #[test]
    fn test_contiguous_segments_pass() {
        assert!(check_contiguous(&[segment(0), segment(1), segment(2)]).is_ok());
    }

    #[test]
    fn test_empty_segments_fail() {
        assert!(matches!(
            check_contiguous(&[]),
            Err(PipelineError::SegmentationMismatch { .. })
        ));
    }

    #[test]
    fn test_gap_in_segments_fails() {
        let err = check_contiguous(&[segment(0), segment(2)]).unwrap_err();
        assert!(err.to_string().contains("output_002.mp3"));

        assert!(check_contiguous(&[segment(1)]).is_err());
    }

    #[tokio::test]
    async fn test_sink_without_receiver_is_silent() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = EventSink::new(Some(tx));
        sink.log("nobody listens").await;
        EventSink::default().progress(10, "nothing").await;
    }
}
