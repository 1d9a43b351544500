//! Pipeline update events.
//!
//! Every transition the orchestrator makes is published as a `PipelineEvent`
//! carrying an immutable snapshot of the pipeline after the change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pipeline::Pipeline;
use super::stage::StageKind;

/// A single pipeline update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    pub pipeline_id: Uuid,

    pub subject_id: String,

    /// Stage the event concerns (if applicable)
    pub stage_id: Option<StageKind>,

    pub event_type: PipelineEventType,

    /// Human-readable summary
    pub summary: String,

    /// Error message if something failed
    pub error: Option<String>,

    /// Pipeline state after the transition
    pub snapshot: Pipeline,
}

impl PipelineEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        event_type: PipelineEventType,
        stage_id: Option<StageKind>,
        summary: String,
        snapshot: Pipeline,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            pipeline_id: snapshot.id,
            subject_id: snapshot.subject_id.clone(),
            stage_id,
            event_type,
            summary,
            error: None,
            snapshot,
        }
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of pipeline updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventType {
    /// A new run has started
    PipelineStarted,

    /// A stage entered processing
    StageStarted,

    /// Intra-stage progress tick
    StageProgress,

    /// A stage completed successfully
    StageCompleted,

    /// A stage failed and halted the pipeline
    StageFailed,

    /// Video synthesis failed; a placeholder was substituted
    VideoDegraded,

    PipelinePaused,

    PipelineResumed,

    /// A failed stage was reset for another attempt
    StageRetrying,

    PipelineCompleted,

    PipelineFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentType;

    #[test]
    fn test_event_serialization() {
        let pipeline = Pipeline::new("proj-7", DocumentType::Board);
        let event = PipelineEvent::new(
            PipelineEventType::StageStarted,
            Some(StageKind::Extract),
            "Text Extraction started".to_string(),
            pipeline.clone(),
        );

        let json = serde_json::to_string(&event).unwrap();
        let parsed: PipelineEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, PipelineEventType::StageStarted);
        assert_eq!(parsed.stage_id, Some(StageKind::Extract));
        assert_eq!(parsed.pipeline_id, pipeline.id);
        assert_eq!(parsed.subject_id, "proj-7");
    }

    #[test]
    fn test_event_with_error() {
        let event = PipelineEvent::new(
            PipelineEventType::StageFailed,
            Some(StageKind::Analyze),
            "AI Analysis failed".to_string(),
            Pipeline::new("proj", DocumentType::Quarterly),
        )
        .with_error("Connection timeout".to_string());

        assert_eq!(event.error, Some("Connection timeout".to_string()));
    }
}
