//! Durable pipeline snapshots keyed by subject id.
//!
//! The snapshot is rewritten after every stage transition so a restart can
//! pick up an in-flight run. Writes go to a temp file in the same directory
//! and are renamed into place, so readers never see a half-written file.
//!
//! Layout for `FileSnapshotStore`:
//!
//! ```text
//! <base>/<subject-key>/snapshot.json
//! <base>/<subject-key>/document.json   (file name + fingerprint)
//! <base>/<subject-key>/document.bin    (raw upload)
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;

use crate::domain::{Document, Pipeline};
use crate::error::PipelineError;

/// Persistence port used by the orchestrator
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the snapshot for the pipeline's subject
    async fn save(&self, pipeline: &Pipeline) -> Result<(), PipelineError>;

    async fn load(&self, subject_id: &str) -> Result<Option<Pipeline>, PipelineError>;

    /// Remove the snapshot and any stored document
    async fn delete(&self, subject_id: &str) -> Result<(), PipelineError>;

    /// Keep the upload so stages needing it can run after a restart
    async fn save_document(&self, document: &Document) -> Result<(), PipelineError>;

    async fn load_document(&self, subject_id: &str) -> Result<Option<Document>, PipelineError>;

    /// Snapshots currently persisted
    async fn list(&self) -> Result<Vec<Pipeline>, PipelineError>;
}

fn persistence<'a, E: std::fmt::Display>(
    context: &str,
    path: &'a Path,
) -> impl FnOnce(E) -> PipelineError + 'a {
    let context = context.to_string();
    move |e| PipelineError::Persistence(format!("{} {}: {}", context, path.display(), e))
}

/// Directory name for a subject id
///
/// Ids made of `[A-Za-z0-9_-]` are used as-is; anything else is hashed so it
/// cannot escape the base directory.
pub fn subject_key(subject_id: &str) -> String {
    let safe = !subject_id.is_empty()
        && subject_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        return subject_id.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(subject_id.as_bytes());
    format!("s-{}", hex::encode(&hasher.finalize()[..8]))
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentMeta {
    subject_id: String,
    file_name: String,
    fingerprint: String,
}

/// File-based snapshot store
pub struct FileSnapshotStore {
    base_dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store under the configured home ($REPORTFLOW_HOME/pipelines)
    pub fn open_default(config: &crate::config::ResolvedConfig) -> Self {
        Self::new(config.pipelines_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn subject_dir(&self, subject_id: &str) -> PathBuf {
        self.base_dir.join(subject_key(subject_id))
    }

    fn snapshot_path(&self, subject_id: &str) -> PathBuf {
        self.subject_dir(subject_id).join("snapshot.json")
    }

    /// Write `bytes` to `path` via temp file + rename
    async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<(), PipelineError> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| PipelineError::Persistence(format!("No parent for {}", path.display())))?;

        fs::create_dir_all(&dir)
            .await
            .map_err(persistence("Failed to create directory", &dir))?;

        tokio::task::spawn_blocking(move || {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .map_err(persistence("Failed to create temp file in", &dir))?;
            tmp.write_all(&bytes)
                .map_err(persistence("Failed to write", &path))?;
            tmp.as_file()
                .sync_all()
                .map_err(persistence("Failed to sync", &path))?;
            tmp.persist(&path)
                .map_err(persistence("Failed to replace", &path))?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::Persistence(format!("Snapshot writer panicked: {}", e)))?
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, PipelineError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(persistence("Failed to read", path)(e)),
        }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, pipeline: &Pipeline) -> Result<(), PipelineError> {
        let json = serde_json::to_vec_pretty(pipeline)
            .map_err(|e| PipelineError::Persistence(format!("Failed to serialize snapshot: {}", e)))?;
        Self::write_atomic(self.snapshot_path(&pipeline.subject_id), json).await
    }

    async fn load(&self, subject_id: &str) -> Result<Option<Pipeline>, PipelineError> {
        let path = self.snapshot_path(subject_id);
        let Some(bytes) = Self::read_optional(&path).await? else {
            return Ok(None);
        };

        let pipeline = serde_json::from_slice(&bytes)
            .map_err(persistence("Failed to parse snapshot", &path))?;
        Ok(Some(pipeline))
    }

    async fn delete(&self, subject_id: &str) -> Result<(), PipelineError> {
        let dir = self.subject_dir(subject_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(persistence("Failed to remove", &dir)(e)),
        }
    }

    async fn save_document(&self, document: &Document) -> Result<(), PipelineError> {
        let dir = self.subject_dir(&document.subject_id);
        let meta = DocumentMeta {
            subject_id: document.subject_id.clone(),
            file_name: document.file_name.clone(),
            fingerprint: document.fingerprint(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| PipelineError::Persistence(format!("Failed to serialize document metadata: {}", e)))?;

        Self::write_atomic(dir.join("document.bin"), document.bytes.clone()).await?;
        Self::write_atomic(dir.join("document.json"), meta_json).await
    }

    async fn load_document(&self, subject_id: &str) -> Result<Option<Document>, PipelineError> {
        let dir = self.subject_dir(subject_id);
        let meta_path = dir.join("document.json");
        let Some(meta_bytes) = Self::read_optional(&meta_path).await? else {
            return Ok(None);
        };
        let meta: DocumentMeta = serde_json::from_slice(&meta_bytes)
            .map_err(persistence("Failed to parse", &meta_path))?;

        let bin_path = dir.join("document.bin");
        let Some(bytes) = Self::read_optional(&bin_path).await? else {
            return Ok(None);
        };

        let document = Document::new(meta.subject_id, meta.file_name, bytes);
        if document.fingerprint() != meta.fingerprint {
            return Err(PipelineError::Persistence(format!(
                "Stored document for '{}' does not match its fingerprint",
                subject_id
            )));
        }
        Ok(Some(document))
    }

    async fn list(&self) -> Result<Vec<Pipeline>, PipelineError> {
        let mut pipelines = Vec::new();

        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(pipelines),
            Err(e) => return Err(persistence("Failed to list", &self.base_dir)(e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(persistence("Failed to list", &self.base_dir))?
        {
            let path = entry.path().join("snapshot.json");
            if let Some(bytes) = Self::read_optional(&path).await? {
                if let Ok(pipeline) = serde_json::from_slice::<Pipeline>(&bytes) {
                    pipelines.push(pipeline);
                }
            }
        }

        // Most recently updated first
        pipelines.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        Ok(pipelines)
    }
}

/// In-memory store, for tests and embedding
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Pipeline>>,
    documents: RwLock<HashMap<String, Document>>,
    fail_writes: bool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    fn check_writable(&self) -> Result<(), PipelineError> {
        if self.fail_writes {
            return Err(PipelineError::Persistence("store is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, pipeline: &Pipeline) -> Result<(), PipelineError> {
        self.check_writable()?;
        self.snapshots
            .write()
            .await
            .insert(pipeline.subject_id.clone(), pipeline.clone());
        Ok(())
    }

    async fn load(&self, subject_id: &str) -> Result<Option<Pipeline>, PipelineError> {
        Ok(self.snapshots.read().await.get(subject_id).cloned())
    }

    async fn delete(&self, subject_id: &str) -> Result<(), PipelineError> {
        self.check_writable()?;
        self.snapshots.write().await.remove(subject_id);
        self.documents.write().await.remove(subject_id);
        Ok(())
    }

    async fn save_document(&self, document: &Document) -> Result<(), PipelineError> {
        self.check_writable()?;
        self.documents
            .write()
            .await
            .insert(document.subject_id.clone(), document.clone());
        Ok(())
    }

    async fn load_document(&self, subject_id: &str) -> Result<Option<Document>, PipelineError> {
        Ok(self.documents.read().await.get(subject_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Pipeline>, PipelineError> {
        let mut pipelines: Vec<Pipeline> = self.snapshots.read().await.values().cloned().collect();
        pipelines.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        Ok(pipelines)
    }
}
