//! Core orchestration logic.
//!
//! This module contains:
//! - Orchestrator: drives the stages and publishes pipeline events
//! - SnapshotStore: durable pipeline snapshots for resume-after-restart
//! - Estimator: simulated intra-stage progress
//! - Reporter: status log and milestone notifications

pub mod estimator;
pub mod orchestrator;
pub mod reporter;
pub mod snapshot_store;

// Re-export commonly used types
pub use estimator::{
    FixedIncrementEstimator, ProgressEstimator, ProgressSettings, RandomEstimator,
    SIMULATED_PROGRESS_CAP,
};
pub use orchestrator::{
    Orchestrator, OrchestratorSettings, PipelineRun, RunControl, RunOutcome,
    EVENT_CHANNEL_CAPACITY,
};
pub use reporter::{
    MilestoneNotice, Notice, NotificationSink, Reporter, StatusMessage, TracingSink, MILESTONES,
    STATUS_LOG_CAPACITY,
};
pub use snapshot_store::{subject_key, FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
