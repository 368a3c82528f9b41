//! Progress aggregation.
//!
//! A job is a sequence of weighted stages. The aggregator maps the fractional
//! progress of whichever stage is current onto one overall percentage that
//! never goes backwards.

use crate::job::{PipelineMode, StagePlan};

/// Share of the total weight spent on per-file transcoding in batch mode.
pub const TRANSCODE_SHARE: f64 = 0.7;

/// Share of the total weight spent on merging in batch mode.
pub const MERGE_SHARE: f64 = 0.3;

/// Maps weighted stage progress onto a monotonic 0..=100 value.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    weights: Vec<f64>,
    current: usize,
    last: u8,
}

impl ProgressAggregator {
    /// One stage owning all of the weight.
    pub fn single() -> Self {
        Self::with_weights(vec![1.0])
    }

    /// `inputs` transcode stages splitting [`TRANSCODE_SHARE`] evenly, then a
    /// merge stage with [`MERGE_SHARE`]. `inputs` must be non-zero.
    pub fn batch(inputs: usize) -> Self {
        let per_file = TRANSCODE_SHARE / inputs as f64;
        let mut weights = vec![per_file; inputs];
        weights.push(MERGE_SHARE);
        Self::with_weights(weights)
    }

    /// Aggregator matching a stage plan.
    pub fn for_plan(plan: &StagePlan) -> Self {
        match plan.mode {
            PipelineMode::Single => Self::single(),
            PipelineMode::Batch => Self::batch(plan.transcodes.len()),
        }
    }

    fn with_weights(weights: Vec<f64>) -> Self {
        Self {
            weights,
            current: 0,
            last: 0,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.weights.len()
    }

    /// Weight of a stage, or 0 for an unknown stage.
    pub fn weight(&self, stage: usize) -> f64 {
        self.weights.get(stage).copied().unwrap_or(0.0)
    }

    /// Index of the stage currently being mapped.
    pub fn current_stage(&self) -> usize {
        self.current
    }

    /// Last value handed out.
    pub fn percent(&self) -> u8 {
        self.last
    }

    /// Reports `fraction` of `stage` and returns the overall percentage.
    ///
    /// The result is clamped to the last value returned, so a regression in
    /// the underlying progress never shows.
    pub fn report(&mut self, stage: usize, fraction: f64) -> u8 {
        let stage = stage.min(self.weights.len().saturating_sub(1));
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };

        let completed: f64 = self.weights[..stage].iter().sum();
        let overall = 100.0 * (completed + self.weight(stage) * fraction);
        let percent = overall.round().clamp(0.0, 100.0) as u8;

        self.last = self.last.max(percent);
        self.last
    }

    /// Switches to `stage` and reports it as just started.
    pub fn begin_stage(&mut self, stage: usize) -> u8 {
        self.current = stage;
        self.report(stage, 0.0)
    }

    /// Reports progress of the current stage.
    pub fn report_current(&mut self, fraction: f64) -> u8 {
        self.report(self.current, fraction)
    }

    /// Marks the current stage as done.
    pub fn complete_current(&mut self) -> u8 {
        self.report(self.current, 1.0)
    }

    /// Pins the value to 100 once the job has completed.
    pub fn finish(&mut self) -> u8 {
        self.last = 100;
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for inputs in 1..=7 {
            let progress = ProgressAggregator::batch(inputs);
            let total: f64 = (0..progress.stage_count()).map(|i| progress.weight(i)).sum();
            assert!((total - 1.0).abs() < 1e-9, "inputs = {}", inputs);
            assert_eq!(progress.stage_count(), inputs + 1);
        }
        assert_eq!(ProgressAggregator::single().weight(0), 1.0);
    }

    #[test]
    fn test_two_input_batch_split() {
        let mut progress = ProgressAggregator::batch(2);

        assert_eq!(progress.begin_stage(0), 0);
        assert_eq!(progress.report_current(0.4), 14);
        assert_eq!(progress.complete_current(), 35);
        assert_eq!(progress.begin_stage(1), 35);
        assert_eq!(progress.complete_current(), 70);
        assert_eq!(progress.begin_stage(2), 70);
        assert_eq!(progress.report_current(0.5), 85);
        assert_eq!(progress.complete_current(), 100);
    }

    #[test]
    fn test_single_stage_maps_directly() {
        let mut progress = ProgressAggregator::single();
        progress.begin_stage(0);
        assert_eq!(progress.report_current(0.42), 42);
        assert_eq!(progress.report_current(1.0), 100);
    }

    #[test]
    fn test_regression_is_clamped() {
        let mut progress = ProgressAggregator::single();
        progress.begin_stage(0);
        assert_eq!(progress.report_current(0.6), 60);
        assert_eq!(progress.report_current(0.3), 60);
        assert_eq!(progress.report_current(f64::NAN), 60);
        assert_eq!(progress.report_current(0.7), 70);
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        let mut progress = ProgressAggregator::batch(1);
        assert_eq!(progress.report(0, 2.0), 70);
        assert_eq!(progress.report(9, 1.0), 100);
        assert_eq!(progress.weight(9), 0.0);
    }

    #[test]
    fn test_finish_pins_to_hundred() {
        let mut progress = ProgressAggregator::batch(3);
        progress.begin_stage(1);
        progress.report_current(0.5);
        assert_eq!(progress.finish(), 100);
        assert_eq!(progress.percent(), 100);
    }
}
