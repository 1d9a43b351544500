//! Limits enforced at the collaborator boundary.
//!
//! Guards against wasted calls and empty results:
//! - Document size (checked before any network call)
//! - Call timeouts
//! - Minimum viable extracted text
//! - Required fields on synthesis results

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{CollaboratorError, CollaboratorErrorKind};
use crate::domain::{Document, ExtractedText, StageKind};

/// Limits applied to every collaborator call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorLimits {
    /// Maximum document size in bytes (default: 50MB)
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,

    /// Network timeout for upload, extraction and analysis calls (default: 30s)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Timeout for audio and video synthesis (default: 300s)
    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_seconds: u64,

    /// Extracted text shorter than this counts as an extraction failure
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

fn default_max_document_bytes() -> u64 {
    50 * 1024 * 1024
} // 50MB
fn default_timeout() -> u64 {
    30
}
fn default_synthesis_timeout() -> u64 {
    300
} // 5 min
fn default_min_text_chars() -> usize {
    100
}

impl Default for CollaboratorLimits {
    fn default() -> Self {
        Self {
            max_document_bytes: default_max_document_bytes(),
            timeout_seconds: default_timeout(),
            synthesis_timeout_seconds: default_synthesis_timeout(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

impl CollaboratorLimits {
    /// Effective timeout for a stage's collaborator call
    pub fn timeout_for(&self, stage: StageKind) -> Duration {
        let seconds = match stage {
            StageKind::SynthesizeAudio | StageKind::SynthesizeVideo => {
                self.synthesis_timeout_seconds
            }
            _ => self.timeout_seconds,
        };
        Duration::from_secs(seconds)
    }

    /// Validate a document before it leaves the process
    pub fn validate_document(&self, document: &Document) -> Result<(), CollaboratorError> {
        let size = document.size_bytes();
        if size == 0 {
            return Err(CollaboratorError::rejected(format!(
                "'{}' is empty",
                document.file_name
            )));
        }
        if size > self.max_document_bytes {
            return Err(CollaboratorError::new(
                CollaboratorErrorKind::InputTooLarge,
                format!(
                    "'{}' is {} bytes; the maximum is {} bytes",
                    document.file_name, size, self.max_document_bytes
                ),
            ));
        }
        Ok(())
    }

    /// Treat near-empty extractions as failures, not successes
    pub fn validate_extracted(&self, text: &ExtractedText) -> Result<(), CollaboratorError> {
        let chars = text.content.trim().chars().count();
        if chars < self.min_text_chars {
            return Err(CollaboratorError::new(
                CollaboratorErrorKind::OutputTooSmall,
                format!(
                    "Only {} characters of text could be extracted (minimum {}); \
                     the document may be scanned or image-only",
                    chars, self.min_text_chars
                ),
            ));
        }
        Ok(())
    }

    /// Require a non-empty text field in a collaborator result
    pub fn require_text(&self, field: &str, value: &str) -> Result<(), CollaboratorError> {
        if value.trim().is_empty() {
            return Err(CollaboratorError::invalid_output(format!(
                "Provider returned an empty {}",
                field
            )));
        }
        Ok(())
    }
}
