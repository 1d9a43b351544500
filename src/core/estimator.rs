//! Intra-stage progress estimation.
//!
//! Collaborators do not report real progress, so the orchestrator ticks a
//! stage forward on a cadence while the call is in flight. The strategy is
//! swappable: randomized increments for the UI, fixed ones for tests.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::Stage;

/// Ceiling for simulated progress; the last stretch is left for completion
pub const SIMULATED_PROGRESS_CAP: u8 = 95;

/// Strategy for simulated stage progress
pub trait ProgressEstimator: Send + Sync {
    /// How often to tick while the stage is processing
    fn tick_interval(&self, stage: &Stage) -> Duration;

    /// Progress to report on the next tick
    fn next_progress(&self, stage: &Stage) -> u8;
}

/// Tick cadence bounds (configurable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSettings {
    #[serde(default = "default_min_tick_ms")]
    pub min_tick_ms: u64,

    #[serde(default = "default_max_tick_ms")]
    pub max_tick_ms: u64,

    /// Largest single random step, in percent
    #[serde(default = "default_max_increment")]
    pub max_increment: u8,
}

fn default_min_tick_ms() -> u64 {
    250
}
fn default_max_tick_ms() -> u64 {
    3_000
}
fn default_max_increment() -> u8 {
    8
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            min_tick_ms: default_min_tick_ms(),
            max_tick_ms: default_max_tick_ms(),
            max_increment: default_max_increment(),
        }
    }
}

/// Random increments, cadence derived from the stage's estimated duration
#[derive(Debug, Clone, Default)]
pub struct RandomEstimator {
    settings: ProgressSettings,
}

impl RandomEstimator {
    pub fn new(settings: ProgressSettings) -> Self {
        Self { settings }
    }
}

impl ProgressEstimator for RandomEstimator {
    fn tick_interval(&self, stage: &Stage) -> Duration {
        // ~20 ticks across the expected duration
        let ms = (stage.estimated_duration_ms / 20)
            .clamp(self.settings.min_tick_ms, self.settings.max_tick_ms.max(self.settings.min_tick_ms));
        Duration::from_millis(ms)
    }

    fn next_progress(&self, stage: &Stage) -> u8 {
        let max_increment = self.settings.max_increment.max(1);
        let step = rand::rng().random_range(1..=max_increment);
        stage.progress.saturating_add(step).min(SIMULATED_PROGRESS_CAP)
    }
}

/// Deterministic fixed-step estimator
#[derive(Debug, Clone)]
pub struct FixedIncrementEstimator {
    interval: Duration,
    increment: u8,
}

impl FixedIncrementEstimator {
    pub fn new(interval: Duration, increment: u8) -> Self {
        Self {
            interval,
            increment,
        }
    }
}

impl ProgressEstimator for FixedIncrementEstimator {
    fn tick_interval(&self, _stage: &Stage) -> Duration {
        self.interval
    }

    fn next_progress(&self, stage: &Stage) -> u8 {
        stage
            .progress
            .saturating_add(self.increment)
            .min(SIMULATED_PROGRESS_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StageKind;

    #[test]
    fn test_random_estimator_stays_in_bounds() {
        let estimator = RandomEstimator::default();
        let mut stage = Stage::new(StageKind::Analyze);
        stage.start();

        for _ in 0..200 {
            let next = estimator.next_progress(&stage);
            assert!(next > stage.progress || next == SIMULATED_PROGRESS_CAP);
            assert!(next <= SIMULATED_PROGRESS_CAP);
            stage.advance(next);
        }
        assert_eq!(stage.progress, SIMULATED_PROGRESS_CAP);
    }

    #[test]
    fn test_random_estimator_cadence() {
        let estimator = RandomEstimator::default();

        // 5s / 20 = 250ms
        assert_eq!(
            estimator.tick_interval(&Stage::new(StageKind::Upload)),
            Duration::from_millis(250)
        );
        // 120s / 20 = 6s, clamped to 3s
        assert_eq!(
            estimator.tick_interval(&Stage::new(StageKind::SynthesizeVideo)),
            Duration::from_millis(3_000)
        );
    }

    #[test]
    fn test_fixed_increment() {
        let estimator = FixedIncrementEstimator::new(Duration::from_millis(10), 30);
        let mut stage = Stage::new(StageKind::Extract);
        stage.start();

        let progress: Vec<u8> = (0..4)
            .map(|_| {
                let next = estimator.next_progress(&stage);
                stage.advance(next);
                stage.progress
            })
            .collect();

        assert_eq!(progress, vec![30, 60, 90, 95]);
    }
}
