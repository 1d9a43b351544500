//! Uploaded documents and their classification.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

/// An uploaded report, owned by a project (the pipeline's subject)
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    /// Identifier of the owning project/document
    pub subject_id: String,

    /// Original file name (e.g. "q3-2024-report.pdf")
    pub file_name: String,

    /// Raw file contents
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("subject_id", &self.subject_id)
            .field("file_name", &self.file_name)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

impl Document {
    pub fn new(subject_id: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            subject_id: subject_id.into(),
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a document from disk
    pub async fn from_path(subject_id: impl Into<String>, path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read document: {}", path.display()))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        Ok(Self::new(subject_id, file_name, bytes))
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// SHA-256 of the contents, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }

    /// Reject requests that cannot start a pipeline
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.subject_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "document has no owning project id".to_string(),
            ));
        }
        if self.bytes.is_empty() {
            return Err(PipelineError::Validation("no document provided".to_string()));
        }
        Ok(())
    }
}

/// Document classifier; selects prompts and audience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Public-company quarterly report (Investor Relations)
    Quarterly,

    /// Private-company board pack (Board Management)
    Board,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Quarterly => "quarterly",
            DocumentType::Board => "board",
        }
    }

    /// Who the generated material is narrated for
    pub fn audience(&self) -> Audience {
        match self {
            DocumentType::Quarterly => Audience::Investors,
            DocumentType::Board => Audience::BoardMembers,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quarterly" => Ok(DocumentType::Quarterly),
            "board" => Ok(DocumentType::Board),
            other => Err(PipelineError::Validation(format!(
                "unrecognized document type '{}' (expected 'quarterly' or 'board')",
                other
            ))),
        }
    }
}

/// Target audience for analysis and narration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Investors,
    BoardMembers,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Investors => "investors",
            Audience::BoardMembers => "board_members",
        }
    }
}
