//! Pipeline orchestrator.
//!
//! Runs one job at a time through `Preparing → Transcoding* → Merging? →
//! Finalizing → Completed | Failed`. Cleanup runs on every exit path once the
//! job has passed validation, and a cleanup problem never replaces the job's
//! own outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::job::{JobSpecification, StagePlan};

use super::error::PipelineError;
use super::progress::ProgressAggregator;
use super::stages::{EventSink, JobContext};
use super::types::{FinalArtifact, JobEvent, JobOutput, JobState};

/// Holds the busy flag for the lifetime of one job.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs extraction jobs against a single engine instance.
pub struct PipelineOrchestrator<E: Engine> {
    engine: Arc<E>,
    busy: AtomicBool,
    state: RwLock<JobState>,
}

impl<E: Engine + 'static> PipelineOrchestrator<E> {
    /// Creates an orchestrator that owns the engine.
    pub fn new(engine: E) -> Self {
        Self::with_engine(Arc::new(engine))
    }

    /// Creates an orchestrator over a shared engine.
    pub fn with_engine(engine: Arc<E>) -> Self {
        Self {
            engine,
            busy: AtomicBool::new(false),
            state: RwLock::new(JobState::Idle),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// State of the current or most recent job.
    pub async fn state(&self) -> JobState {
        self.state.read().await.clone()
    }

    /// Whether a job is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Runs a job to completion.
    ///
    /// Progress, log lines and state changes are sent on `events` if given.
    pub async fn run(
        &self,
        spec: JobSpecification,
        events: Option<mpsc::Sender<JobEvent>>,
    ) -> Result<JobOutput, PipelineError> {
        self.run_with_cancellation(spec, events, CancellationToken::new())
            .await
    }

    /// Runs a job that can be cancelled between stages.
    ///
    /// A cancelled job still cleans up and ends in [`JobState::Failed`] with
    /// [`PipelineError::Cancelled`].
    pub async fn run_with_cancellation(
        &self,
        spec: JobSpecification,
        events: Option<mpsc::Sender<JobEvent>>,
        cancel: CancellationToken,
    ) -> Result<JobOutput, PipelineError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or(PipelineError::JobInProgress)?;
        let start = Instant::now();
        let sink = EventSink::new(events);

        self.transition(&sink, JobState::Preparing).await;
        sink.progress(0, "Preparing").await;

        if let Err(e) = spec.validate() {
            let err = PipelineError::from(e);
            return Err(self.fail(&sink, err).await);
        }

        if let Err(e) = self.engine.validate().await {
            let err = PipelineError::EngineUnavailable(e);
            return Err(self.fail(&sink, err).await);
        }

        let plan = StagePlan::from_spec(&spec);
        info!(
            "Starting {} job with {} input(s), speed {}, downsample {}, split {}",
            plan.mode,
            spec.inputs.len(),
            spec.options.speed,
            spec.options.downsample,
            spec.options.split
        );

        let mut ctx = JobContext::new(
            self.engine.as_ref(),
            &spec.options,
            ProgressAggregator::for_plan(&plan),
            sink.clone(),
        );

        let outcome = self.run_stages(&mut ctx, &spec, &plan, &cancel).await;

        if outcome.is_err() {
            self.transition(&sink, JobState::Finalizing).await;
        }
        let report = ctx.cleanup.finalize(self.engine.as_ref()).await;
        if !report.is_clean() {
            warn!(
                "Cleanup left {} file(s) behind in the engine filesystem",
                report.failed.len()
            );
        }

        match outcome {
            Ok(artifacts) => {
                let percent = ctx.progress.finish();
                sink.progress(percent, "Done").await;
                self.transition(&sink, JobState::Completed).await;

                let output = JobOutput {
                    mode: plan.mode,
                    artifacts,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                };
                info!(
                    "Job completed: {} artifact(s), {} bytes in {} ms",
                    output.artifacts.len(),
                    output.total_bytes(),
                    output.elapsed_ms
                );
                Ok(output)
            }
            Err(e) => Err(self.fail(&sink, e).await),
        }
    }

    async fn run_stages(
        &self,
        ctx: &mut JobContext<'_, E>,
        spec: &JobSpecification,
        plan: &StagePlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<FinalArtifact>, PipelineError> {
        let total = plan.transcodes.len();

        for task in &plan.transcodes {
            check_cancelled(cancel)?;
            self.transition(
                &ctx.sink,
                JobState::Transcoding {
                    current_file: task.input_index,
                    total_files: total,
                    file_name: task.input_name.clone(),
                },
            )
            .await;
            ctx.transcode(task, &spec.inputs[task.input_index], total)
                .await?;
        }

        let finals = match &plan.merge {
            Some(merge) => {
                check_cancelled(cancel)?;
                self.transition(
                    &ctx.sink,
                    JobState::Merging {
                        segmented: merge.is_segmented(),
                    },
                )
                .await;
                ctx.merge(merge).await?
            }
            None => plan
                .transcodes
                .iter()
                .map(|t| t.output_name.clone())
                .collect(),
        };

        check_cancelled(cancel)?;
        self.transition(&ctx.sink, JobState::Finalizing).await;
        ctx.collect(&finals).await
    }

    async fn transition(&self, sink: &EventSink, next: JobState) {
        {
            let mut state = self.state.write().await;
            if *state == next {
                return;
            }
            *state = next.clone();
        }
        sink.state(next).await;
    }

    /// Records a failure and hands the error back for returning.
    async fn fail(&self, sink: &EventSink, err: PipelineError) -> PipelineError {
        error!("Job failed during {}: {}", err.phase(), err);
        sink.log(format!("Job failed: {}", err)).await;
        self.transition(sink, JobState::Failed).await;
        err
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{InputFile, JobOptions};
    use crate::testing::MockEngine;

    fn single_job() -> JobSpecification {
        JobSpecification::new(
            vec![InputFile::new("a.mp4", b"video".to_vec())],
            JobOptions::default(),
        )
    }

    #[test]
    fn test_busy_guard_releases_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = BusyGuard::acquire(&flag).unwrap();
            assert!(BusyGuard::acquire(&flag).is_none());
        }
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let orchestrator = PipelineOrchestrator::new(MockEngine::new());
        assert_eq!(orchestrator.state().await, JobState::Idle);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let engine = MockEngine::new();
        engine.set_exec_delay(std::time::Duration::from_millis(200)).await;
        let orchestrator = Arc::new(PipelineOrchestrator::new(engine));

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run(single_job(), None).await })
        };

        // Wait until the first job holds the orchestrator.
        while !orchestrator.is_busy() {
            tokio::task::yield_now().await;
        }

        let second = orchestrator.run(single_job(), None).await;
        assert!(matches!(second, Err(PipelineError::JobInProgress)));

        let output = first.await.unwrap().unwrap();
        assert_eq!(output.names(), vec!["a.mp3"]);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_state_ends_completed() {
        let orchestrator = PipelineOrchestrator::new(MockEngine::new());
        orchestrator.run(single_job(), None).await.unwrap();
        assert_eq!(orchestrator.state().await, JobState::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let engine = MockEngine::new();
        let orchestrator = PipelineOrchestrator::new(engine.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator
            .run_with_cancellation(single_job(), None, cancel)
            .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(orchestrator.state().await, JobState::Failed);
        assert_eq!(engine.exec_count().await, 0);
    }
}
