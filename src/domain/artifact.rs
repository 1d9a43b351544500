//! Outputs produced by pipeline stages.
//!
//! Completed stages leave a typed artifact on the pipeline so a resumed or
//! retried run picks up where it stopped instead of repeating earlier calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Receipt for the document intake stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// SHA-256 of the document contents
    pub fingerprint: String,

    pub size_bytes: u64,

    /// Where the collaborator stored the document, if it stores it remotely
    pub storage_url: Option<String>,

    pub uploaded_at: DateTime<Utc>,
}

/// Text extracted from the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub content: String,
    pub word_count: usize,
}

impl ExtractedText {
    /// Build from raw content, counting words
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count();
        Self {
            content,
            word_count,
        }
    }
}

/// A single reported figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetric {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    /// Period-over-period change, in percent
    #[serde(default)]
    pub change_pct: Option<f64>,
}

/// Structured financial data extracted by analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialData {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metrics: Vec<FinancialMetric>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Result of the analysis stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub script_text: String,
    pub script_alternatives: Vec<String>,
    pub financial_data: FinancialData,
}

/// Result of the script-generation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// Script used for narration
    pub primary: String,
    pub alternatives: Vec<String>,
}

/// Result of the audio-synthesis stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutput {
    pub audio_url: String,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// A rendered avatar video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOutput {
    pub video_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub duration_secs: f64,
}

/// Outcome of the video stage. Video failure never fails the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VideoResult {
    Generated(VideoOutput),

    /// Substituted when synthesis failed or no avatar is configured
    Placeholder { reason: String },
}

impl VideoResult {
    pub fn video_url(&self) -> Option<&str> {
        match self {
            VideoResult::Generated(output) => Some(&output.video_url),
            VideoResult::Placeholder { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, VideoResult::Placeholder { .. })
    }
}

/// Artifacts accumulated by completed stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
    #[serde(default)]
    pub upload: Option<UploadReceipt>,
    #[serde(default)]
    pub extraction: Option<ExtractedText>,
    #[serde(default)]
    pub analysis: Option<AnalysisOutput>,
    #[serde(default)]
    pub scripts: Option<ScriptOutput>,
    #[serde(default)]
    pub audio: Option<AudioOutput>,
    #[serde(default)]
    pub video: Option<VideoResult>,
}

impl RunArtifacts {
    /// Aggregate result, available once every stage has produced its artifact
    pub fn result(&self) -> Option<PipelineResult> {
        let analysis = self.analysis.as_ref()?;
        let scripts = self.scripts.as_ref()?;
        let audio = self.audio.as_ref()?;
        let video = self.video.as_ref()?;

        Some(PipelineResult {
            script_text: scripts.primary.clone(),
            script_alternatives: scripts.alternatives.clone(),
            audio_url: audio.audio_url.clone(),
            video: video.clone(),
            financial_data: analysis.financial_data.clone(),
        })
    }
}

/// What a completed pipeline hands back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub script_text: String,
    pub script_alternatives: Vec<String>,
    pub audio_url: String,
    pub video: VideoResult,
    pub financial_data: FinancialData,
}

impl PipelineResult {
    pub fn video_url(&self) -> Option<&str> {
        self.video.video_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        let text = ExtractedText::from_content("Revenue grew  12%\nyear over year.");
        assert_eq!(text.word_count, 6);
    }

    #[test]
    fn test_result_requires_all_artifacts() {
        let mut artifacts = RunArtifacts {
            analysis: Some(AnalysisOutput {
                script_text: "draft".to_string(),
                script_alternatives: vec![],
                financial_data: FinancialData::default(),
            }),
            scripts: Some(ScriptOutput {
                primary: "final".to_string(),
                alternatives: vec!["short".to_string()],
            }),
            audio: Some(AudioOutput {
                audio_url: "https://cdn.example.com/a.mp3".to_string(),
                duration_secs: None,
            }),
            ..Default::default()
        };
        assert!(artifacts.result().is_none());

        artifacts.video = Some(VideoResult::Placeholder {
            reason: "no avatar".to_string(),
        });
        let result = artifacts.result().unwrap();
        assert_eq!(result.script_text, "final");
        assert_eq!(result.video_url(), None);
        assert!(result.video.is_placeholder());
    }

    #[test]
    fn test_video_result_tagging() {
        let json = serde_json::to_value(VideoResult::Placeholder {
            reason: "timeout".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "placeholder");
    }
}
