//! Domain types for the report pipeline.
//!
//! This module contains the core data structures:
//! - Stage: one ordered unit of work
//! - Pipeline: a run of all stages for one document
//! - Document: the uploaded report and its classification
//! - Artifact: stage outputs and the aggregate result
//! - Events: published pipeline updates

pub mod artifact;
pub mod document;
pub mod events;
pub mod pipeline;
pub mod stage;

// Re-export commonly used types
pub use artifact::{
    AnalysisOutput, AudioOutput, ExtractedText, FinancialData, FinancialMetric, PipelineResult,
    RunArtifacts, ScriptOutput, UploadReceipt, VideoOutput, VideoResult,
};
pub use document::{Audience, Document, DocumentType};
pub use events::{PipelineEvent, PipelineEventType};
pub use pipeline::{
    derive_overall_progress, derive_time_remaining, is_terminal, Pipeline, PipelineStatus,
};
pub use stage::{Stage, StageKind, StageStatus, MAX_PROCESSING_PROGRESS};
