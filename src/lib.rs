//! reportflow - staged document-processing pipeline
//!
//! Turns an uploaded financial or board report into a narration script,
//! a synthesized audio track and an avatar video.
//!
//! # Architecture
//!
//! The orchestrator runs six fixed stages in order:
//! - upload, extract, analyze, generate-scripts, synthesize-audio, synthesize-video
//! - every transition is persisted as a snapshot keyed by project
//! - every transition is published as a `PipelineEvent`
//! - paused or interrupted runs resume from the stage they stopped at
//! - video failure degrades to a placeholder instead of failing the run
//!
//! # Modules
//!
//! - `adapters`: Collaborator traits and the HTTP implementation
//! - `core`: Orchestrator, snapshot store, progress estimation, reporter
//! - `domain`: Data structures (Stage, Pipeline, Document, artifacts, events)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process a quarterly report
//! reportflow process q3.pdf --type quarterly
//!
//! # Check a project's pipeline
//! reportflow status q3
//!
//! # Resume a paused run / retry a failed one
//! reportflow resume q3
//! reportflow retry q3
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use adapters::{
    AnalysisCollaborator, AudioCollaborator, CollaboratorError, CollaboratorErrorKind,
    Collaborators, DocumentCollaborator, VideoCollaborator,
};
pub use core::{Orchestrator, PipelineRun, Reporter, RunOutcome};
pub use domain::{Document, DocumentType, Pipeline, PipelineEvent, PipelineStatus, Stage, StageKind};
pub use error::PipelineError;
