//! Stage model for the document-processing pipeline.
//!
//! A pipeline always runs the same six stages in the same order. Each stage
//! carries its own status, progress and timing so the UI can render it
//! independently of the others.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest progress a stage may report while it is still processing.
///
/// Only completion moves a stage to 100.
pub const MAX_PROCESSING_PROGRESS: u8 = 99;

/// The fixed stages of a report pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Document intake: size checks, fingerprint, hand-off to storage
    Upload,

    /// Text extraction from the uploaded document
    Extract,

    /// AI analysis producing financial data and a draft script
    Analyze,

    /// Final narration script plus alternatives
    GenerateScripts,

    /// Text-to-speech narration
    SynthesizeAudio,

    /// Avatar-narrated video (degrades to a placeholder on failure)
    SynthesizeVideo,
}

impl StageKind {
    /// All stages in execution order
    pub const ALL: [StageKind; 6] = [
        StageKind::Upload,
        StageKind::Extract,
        StageKind::Analyze,
        StageKind::GenerateScripts,
        StageKind::SynthesizeAudio,
        StageKind::SynthesizeVideo,
    ];

    /// Stable identifier used in snapshots and events
    pub fn id(&self) -> &'static str {
        match self {
            StageKind::Upload => "upload",
            StageKind::Extract => "extract",
            StageKind::Analyze => "analyze",
            StageKind::GenerateScripts => "generate-scripts",
            StageKind::SynthesizeAudio => "synthesize-audio",
            StageKind::SynthesizeVideo => "synthesize-video",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            StageKind::Upload => "Upload",
            StageKind::Extract => "Text Extraction",
            StageKind::Analyze => "AI Analysis",
            StageKind::GenerateScripts => "Script Generation",
            StageKind::SynthesizeAudio => "Audio Synthesis",
            StageKind::SynthesizeVideo => "Video Generation",
        }
    }

    /// Description shown next to the stage in the UI
    pub fn description(&self) -> &'static str {
        match self {
            StageKind::Upload => "Validating and storing the uploaded report",
            StageKind::Extract => "Extracting text content from the document",
            StageKind::Analyze => "Analyzing financial data and key metrics",
            StageKind::GenerateScripts => "Writing the narration script and alternatives",
            StageKind::SynthesizeAudio => "Synthesizing the narrated audio track",
            StageKind::SynthesizeVideo => "Rendering the avatar-narrated video",
        }
    }

    /// Planning hint for time-remaining estimates (not a timeout)
    pub fn estimated_duration_ms(&self) -> u64 {
        match self {
            StageKind::Upload => 5_000,
            StageKind::Extract => 15_000,
            StageKind::Analyze => 45_000,
            StageKind::GenerateScripts => 30_000,
            StageKind::SynthesizeAudio => 60_000,
            StageKind::SynthesizeVideo => 120_000,
        }
    }

    /// Position of this stage in the pipeline
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|k| k == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started
    Pending,

    /// Currently executing
    Processing,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// One unit of work in the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stable identifier, unique within a pipeline
    pub id: StageKind,

    pub name: String,

    pub description: String,

    pub status: StageStatus,

    /// Percentage in [0, 100]
    pub progress: u8,

    pub estimated_duration_ms: u64,

    /// Set on entering `processing`
    pub start_time: Option<DateTime<Utc>>,

    /// Set on leaving `processing`
    pub completed_time: Option<DateTime<Utc>>,

    /// Only present while `failed`
    pub error_message: Option<String>,
}

impl Stage {
    /// Create a pending stage
    pub fn new(kind: StageKind) -> Self {
        Self {
            id: kind,
            name: kind.display_name().to_string(),
            description: kind.description().to_string(),
            status: StageStatus::Pending,
            progress: 0,
            estimated_duration_ms: kind.estimated_duration_ms(),
            start_time: None,
            completed_time: None,
            error_message: None,
        }
    }

    /// Enter `processing` from scratch
    pub fn start(&mut self) {
        self.status = StageStatus::Processing;
        self.progress = 0;
        self.start_time = Some(Utc::now());
        self.completed_time = None;
        self.error_message = None;
    }

    /// Re-enter `processing` after a pause, keeping the recorded progress
    pub fn restart(&mut self) {
        self.status = StageStatus::Processing;
        self.start_time = Some(Utc::now());
        self.completed_time = None;
    }

    /// Move progress forward. Ignored unless processing; never goes backwards.
    pub fn advance(&mut self, progress: u8) -> bool {
        if self.status != StageStatus::Processing {
            return false;
        }
        let next = progress.min(MAX_PROCESSING_PROGRESS);
        if next <= self.progress {
            return false;
        }
        self.progress = next;
        true
    }

    pub fn complete(&mut self) {
        self.status = StageStatus::Completed;
        self.progress = 100;
        self.completed_time = Some(Utc::now());
        self.error_message = None;
    }

    /// Mark failed; progress stays where the failure happened
    pub fn fail(&mut self, error_message: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.completed_time = Some(Utc::now());
        self.error_message = Some(error_message.into());
    }

    /// Back to `pending` for a retry
    pub fn reset(&mut self) {
        self.status = StageStatus::Pending;
        self.progress = 0;
        self.start_time = None;
        self.completed_time = None;
        self.error_message = None;
    }

    pub fn is_processing(&self) -> bool {
        self.status == StageStatus::Processing
    }

    pub fn is_completed(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_fixed() {
        let ids: Vec<&str> = StageKind::ALL.iter().map(|k| k.id()).collect();
        assert_eq!(
            ids,
            vec![
                "upload",
                "extract",
                "analyze",
                "generate-scripts",
                "synthesize-audio",
                "synthesize-video"
            ]
        );
        assert_eq!(StageKind::GenerateScripts.index(), 3);
    }

    #[test]
    fn test_progress_only_moves_forward_while_processing() {
        let mut stage = Stage::new(StageKind::Analyze);
        assert!(!stage.advance(20));
        assert_eq!(stage.progress, 0);

        stage.start();
        assert!(stage.advance(20));
        assert!(!stage.advance(10));
        assert_eq!(stage.progress, 20);

        // 100 is reserved for completion
        stage.advance(100);
        assert_eq!(stage.progress, MAX_PROCESSING_PROGRESS);

        stage.complete();
        assert_eq!(stage.progress, 100);
        assert!(stage.completed_time.is_some());
    }

    #[test]
    fn test_fail_then_reset() {
        let mut stage = Stage::new(StageKind::Extract);
        stage.start();
        stage.advance(40);
        stage.fail("Document is password protected");

        assert_eq!(stage.status, StageStatus::Failed);
        assert_eq!(stage.progress, 40);
        assert_eq!(
            stage.error_message.as_deref(),
            Some("Document is password protected")
        );

        stage.reset();
        assert_eq!(stage.status, StageStatus::Pending);
        assert_eq!(stage.progress, 0);
        assert!(stage.error_message.is_none());
        assert!(stage.start_time.is_none());
    }

    #[test]
    fn test_restart_keeps_progress() {
        let mut stage = Stage::new(StageKind::Analyze);
        stage.start();
        stage.advance(45);
        stage.restart();
        assert!(stage.is_processing());
        assert_eq!(stage.progress, 45);
    }

    #[test]
    fn test_stage_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&StageKind::SynthesizeAudio).unwrap();
        assert_eq!(json, "\"synthesize-audio\"");
    }
}
