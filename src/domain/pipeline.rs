//! Pipeline state and its derived values.
//!
//! A Pipeline is one end-to-end run of all stages for a single document. It
//! is mutated only by the orchestrator; everyone else sees cloned snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::RunArtifacts;
use super::document::DocumentType;
use super::stage::{Stage, StageKind, StageStatus};

/// A document-processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique per run
    pub id: Uuid,

    /// Owning project/document; snapshots are keyed by it
    pub subject_id: String,

    pub document_type: DocumentType,

    pub status: PipelineStatus,

    /// Fixed order, never reordered
    pub stages: Vec<Stage>,

    /// Stage currently processing (or last attempted)
    pub current_stage_index: usize,

    /// Unweighted average of stage progress
    pub overall_progress: f64,

    /// Sum of estimated durations of stages not yet completed
    pub estimated_time_remaining_ms: u64,

    pub start_time: DateTime<Utc>,

    pub last_update: DateTime<Utc>,

    pub can_pause: bool,

    pub can_resume: bool,

    /// Outputs of completed stages
    #[serde(default)]
    pub artifacts: RunArtifacts,
}

impl Pipeline {
    /// Create a queued pipeline with the six stages pending
    pub fn new(subject_id: impl Into<String>, document_type: DocumentType) -> Self {
        let now = Utc::now();
        let mut pipeline = Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            document_type,
            status: PipelineStatus::Queued,
            stages: StageKind::ALL.iter().map(|k| Stage::new(*k)).collect(),
            current_stage_index: 0,
            overall_progress: 0.0,
            estimated_time_remaining_ms: 0,
            start_time: now,
            last_update: now,
            can_pause: false,
            can_resume: false,
            artifacts: RunArtifacts::default(),
        };
        pipeline.refresh_derived();
        pipeline
    }

    /// Change status and recompute everything derived from it
    pub fn set_status(&mut self, status: PipelineStatus) {
        self.status = status;
        self.refresh_derived();
    }

    /// Recompute progress, time remaining and pause/resume affordances
    pub fn refresh_derived(&mut self) {
        self.overall_progress = derive_overall_progress(self);
        self.estimated_time_remaining_ms = derive_time_remaining(self, 0);
        self.can_pause = self.status == PipelineStatus::Processing;
        self.can_resume = self.status == PipelineStatus::Paused;
        self.last_update = Utc::now();
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.stages.get(self.current_stage_index)
    }

    pub fn current_stage_mut(&mut self) -> Option<&mut Stage> {
        self.stages.get_mut(self.current_stage_index)
    }

    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == kind)
    }

    pub fn is_last_stage(&self) -> bool {
        self.current_stage_index + 1 >= self.stages.len()
    }

    /// The stage that failed, if any
    pub fn failed_stage(&self) -> Option<&Stage> {
        self.stages.iter().find(|s| s.status == StageStatus::Failed)
    }
}

/// Average of all stage progress values; each stage weighs the same
pub fn derive_overall_progress(pipeline: &Pipeline) -> f64 {
    if pipeline.stages.is_empty() {
        return 0.0;
    }
    let total: u32 = pipeline.stages.iter().map(|s| s.progress as u32).sum();
    total as f64 / pipeline.stages.len() as f64
}

/// Sum of estimated durations for stages at or after `from_stage_index`
/// that have not completed
pub fn derive_time_remaining(pipeline: &Pipeline, from_stage_index: usize) -> u64 {
    pipeline
        .stages
        .iter()
        .skip(from_stage_index)
        .filter(|s| !s.is_completed())
        .map(|s| s.estimated_duration_ms)
        .sum()
}

/// Whether a run in this status has stopped for good
pub fn is_terminal(status: PipelineStatus) -> bool {
    matches!(status, PipelineStatus::Completed | PipelineStatus::Failed)
}

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Created, not yet running
    Queued,

    /// Stages are executing
    Processing,

    /// All stages completed
    Completed,

    /// A stage failed; can be retried
    Failed,

    /// Paused (can be resumed)
    Paused,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStatus::Queued => "queued",
            PipelineStatus::Processing => "processing",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Paused => "paused",
        };
        f.write_str(s)
    }
}
