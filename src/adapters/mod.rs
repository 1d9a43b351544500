//! Collaborator interfaces for external services.
//!
//! The pipeline core never talks to a provider directly. Each stage goes
//! through one of the traits below, and every result is validated into a
//! typed `Result` before it reaches the orchestrator.

pub mod http;
pub mod limits;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    AnalysisOutput, Audience, AudioOutput, Document, DocumentType, ExtractedText, ScriptOutput,
    UploadReceipt, VideoOutput,
};

// Re-export the concrete providers
pub use http::{EndpointConfig, HttpCollaborator};
pub use limits::CollaboratorLimits;

/// Why a collaborator call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorErrorKind {
    /// Provider answered with `success: false` or an error status
    Rejected,

    /// No answer within the configured timeout
    Timeout,

    /// Input above the size threshold; rejected before any network call
    InputTooLarge,

    /// Output below the minimum viable size
    OutputTooSmall,

    /// Output missing required fields
    InvalidOutput,

    /// Network or decoding failure
    Transport,

    /// Call aborted because the pipeline was paused
    Cancelled,
}

impl fmt::Display for CollaboratorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollaboratorErrorKind::Rejected => "rejected",
            CollaboratorErrorKind::Timeout => "timeout",
            CollaboratorErrorKind::InputTooLarge => "input_too_large",
            CollaboratorErrorKind::OutputTooSmall => "output_too_small",
            CollaboratorErrorKind::InvalidOutput => "invalid_output",
            CollaboratorErrorKind::Transport => "transport",
            CollaboratorErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A failed collaborator call. The message is shown to users verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CollaboratorError {
    pub kind: CollaboratorErrorKind,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(kind: CollaboratorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Rejected, message)
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::InvalidOutput, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Transport, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == CollaboratorErrorKind::Cancelled
    }
}

/// Voice parameters for text-to-speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    #[serde(default)]
    pub style: f32,
    #[serde(default = "default_speaker_boost")]
    pub use_speaker_boost: bool,
}

fn default_stability() -> f32 {
    0.5
}
fn default_similarity_boost() -> f32 {
    0.75
}
fn default_speaker_boost() -> bool {
    true
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            style: 0.0,
            use_speaker_boost: default_speaker_boost(),
        }
    }
}

/// Document intake and text extraction
#[async_trait]
pub trait DocumentCollaborator: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Hand the document to storage. Providers without remote storage
    /// return a local receipt.
    async fn upload(&self, document: &Document) -> Result<UploadReceipt, CollaboratorError> {
        Ok(UploadReceipt {
            fingerprint: document.fingerprint(),
            size_bytes: document.size_bytes(),
            storage_url: None,
            uploaded_at: Utc::now(),
        })
    }

    /// Extract the document's text
    async fn extract_text(&self, document: &Document) -> Result<ExtractedText, CollaboratorError>;
}

/// AI analysis and script writing
#[async_trait]
pub trait AnalysisCollaborator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce financial data, a draft script and alternatives
    async fn analyze(
        &self,
        text: &str,
        document_type: DocumentType,
        audience: Audience,
    ) -> Result<AnalysisOutput, CollaboratorError>;

    /// Produce the narration script. Defaults to the analysis draft.
    async fn generate_scripts(
        &self,
        analysis: &AnalysisOutput,
        _document_type: DocumentType,
        _audience: Audience,
    ) -> Result<ScriptOutput, CollaboratorError> {
        scripts_from_analysis(analysis)
    }
}

/// Take the analysis draft as the primary script, dropping blank and
/// duplicate alternatives
pub fn scripts_from_analysis(analysis: &AnalysisOutput) -> Result<ScriptOutput, CollaboratorError> {
    let primary = analysis.script_text.trim();
    if primary.is_empty() {
        return Err(CollaboratorError::invalid_output(
            "Analysis returned an empty script",
        ));
    }

    let alternatives = analysis
        .script_alternatives
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != primary)
        .map(str::to_string)
        .collect();

    Ok(ScriptOutput {
        primary: primary.to_string(),
        alternatives,
    })
}

/// Text-to-speech narration
#[async_trait]
pub trait AudioCollaborator: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize_audio(
        &self,
        script_text: &str,
        voice_id: &str,
        voice_settings: &VoiceSettings,
    ) -> Result<AudioOutput, CollaboratorError>;
}

/// Avatar video. Callers treat failure as non-fatal.
#[async_trait]
pub trait VideoCollaborator: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize_video(
        &self,
        script_text: &str,
        avatar_id: &str,
    ) -> Result<VideoOutput, CollaboratorError>;
}

/// The full set of collaborators a pipeline needs
#[derive(Clone)]
pub struct Collaborators {
    pub document: Arc<dyn DocumentCollaborator>,
    pub analysis: Arc<dyn AnalysisCollaborator>,
    pub audio: Arc<dyn AudioCollaborator>,
    pub video: Arc<dyn VideoCollaborator>,
}

impl Collaborators {
    /// Use one provider for every stage
    pub fn from_single<C>(collaborator: Arc<C>) -> Self
    where
        C: DocumentCollaborator
            + AnalysisCollaborator
            + AudioCollaborator
            + VideoCollaborator
            + 'static,
    {
        Self {
            document: collaborator.clone(),
            analysis: collaborator.clone(),
            audio: collaborator.clone(),
            video: collaborator,
        }
    }
}
