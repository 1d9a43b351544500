//! Snapshot Store Integration Tests
//!
//! Tests for the on-disk snapshot format, listing order and document storage.

use reportflow::core::{subject_key, FileSnapshotStore, SnapshotStore};
use reportflow::domain::{Document, DocumentType, Pipeline, PipelineStatus, StageStatus};
use tempfile::TempDir;

#[tokio::test]
async fn test_snapshot_format() {
    let temp = TempDir::new().unwrap();
    let store = FileSnapshotStore::new(temp.path());

    let mut pipeline = Pipeline::new("acme-q3", DocumentType::Quarterly);
    pipeline.set_status(PipelineStatus::Processing);
    pipeline.stages[0].start();
    pipeline.stages[0].advance(20);
    pipeline.refresh_derived();
    store.save(&pipeline).await.unwrap();

    let raw = std::fs::read_to_string(temp.path().join("acme-q3").join("snapshot.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(json["status"], "processing");
    assert_eq!(json["document_type"], "quarterly");
    assert_eq!(json["stages"][0]["id"], "upload");
    assert_eq!(json["stages"][0]["status"], "processing");
    assert_eq!(json["stages"][0]["progress"], 20);
    assert_eq!(json["stages"][3]["id"], "generate-scripts");

    // Timestamps are ISO 8601 strings and parse back to the same instant
    let start = json["stages"][0]["start_time"].as_str().unwrap();
    assert!(start.contains('T'));
    let loaded = store.load("acme-q3").await.unwrap().unwrap();
    assert_eq!(loaded.stages[0].start_time, pipeline.stages[0].start_time);
    assert_eq!(loaded.last_update, pipeline.last_update);
}

#[tokio::test]
async fn test_list_most_recent_first() {
    let temp = TempDir::new().unwrap();
    let store = FileSnapshotStore::new(temp.path());

    let older = Pipeline::new("older", DocumentType::Board);
    store.save(&older).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let mut newer = Pipeline::new("newer", DocumentType::Quarterly);
    newer.set_status(PipelineStatus::Paused);
    store.save(&newer).await.unwrap();

    // Stray files are ignored
    std::fs::create_dir_all(temp.path().join("junk")).unwrap();
    std::fs::write(temp.path().join("junk").join("snapshot.json"), "garbage").unwrap();

    let subjects: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.subject_id)
        .collect();
    assert_eq!(subjects, vec!["newer".to_string(), "older".to_string()]);
}

#[tokio::test]
async fn test_unsafe_subject_ids_stay_inside_base_dir() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("pipelines");
    let store = FileSnapshotStore::new(&base);

    let subject = "../outside/acme q3";
    let mut pipeline = Pipeline::new(subject, DocumentType::Quarterly);
    pipeline.stages[0].fail("boom");
    pipeline.set_status(PipelineStatus::Failed);
    store.save(&pipeline).await.unwrap();
    store
        .save_document(&Document::new(subject, "q3.pdf", b"%PDF".to_vec()))
        .await
        .unwrap();

    assert!(base.join(subject_key(subject)).join("snapshot.json").exists());
    assert!(!temp.path().join("outside").exists());

    let loaded = store.load(subject).await.unwrap().unwrap();
    assert_eq!(loaded.subject_id, subject);
    assert_eq!(loaded.stages[0].status, StageStatus::Failed);
    assert_eq!(loaded.stages[0].error_message.as_deref(), Some("boom"));

    let document = store.load_document(subject).await.unwrap().unwrap();
    assert_eq!(document.file_name, "q3.pdf");
}

#[tokio::test]
async fn test_tampered_document_is_rejected() {
    let temp = TempDir::new().unwrap();
    let store = FileSnapshotStore::new(temp.path());

    store
        .save_document(&Document::new("acme", "q3.pdf", b"%PDF-1.7 original".to_vec()))
        .await
        .unwrap();
    std::fs::write(temp.path().join("acme").join("document.bin"), b"%PDF-1.7 changed").unwrap();

    assert!(store.load_document("acme").await.is_err());
}
