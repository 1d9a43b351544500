//! Collaborator Limits Integration Tests
//!
//! Tests for document size limits, extracted-text thresholds, timeouts
//! and limit parsing.

use std::time::Duration;

use reportflow::adapters::{CollaboratorErrorKind, CollaboratorLimits};
use reportflow::domain::{Document, ExtractedText, StageKind};

fn document(bytes: usize) -> Document {
    Document::new("proj", "report.pdf", vec![b'x'; bytes])
}

#[test]
fn test_max_document_bytes() {
    let limits = CollaboratorLimits {
        max_document_bytes: 100,
        ..Default::default()
    };

    // Within limits
    assert!(limits.validate_document(&document(50)).is_ok());

    // At exact limit
    assert!(limits.validate_document(&document(100)).is_ok());

    // Exceeding limit
    let err = limits.validate_document(&document(200)).unwrap_err();
    assert_eq!(err.kind, CollaboratorErrorKind::InputTooLarge);
    assert_eq!(
        err.message,
        "'report.pdf' is 200 bytes; the maximum is 100 bytes"
    );
}

#[test]
fn test_empty_document_rejected() {
    let limits = CollaboratorLimits::default();

    let err = limits.validate_document(&document(0)).unwrap_err();
    assert_eq!(err.kind, CollaboratorErrorKind::Rejected);
}

#[test]
fn test_min_extracted_text() {
    let limits = CollaboratorLimits {
        min_text_chars: 20,
        ..Default::default()
    };

    assert!(limits
        .validate_extracted(&ExtractedText::from_content("Net income rose to $4.1M in Q3."))
        .is_ok());

    // Whitespace does not count
    let err = limits
        .validate_extracted(&ExtractedText::from_content(format!("  short  {}", "\n".repeat(50))))
        .unwrap_err();
    assert_eq!(err.kind, CollaboratorErrorKind::OutputTooSmall);
    assert!(err.message.starts_with("Only 5 characters"));
}

#[test]
fn test_required_text_fields() {
    let limits = CollaboratorLimits::default();

    assert!(limits.require_text("audio URL", "https://cdn.example/a.mp3").is_ok());

    let err = limits.require_text("audio URL", "   ").unwrap_err();
    assert_eq!(err.kind, CollaboratorErrorKind::InvalidOutput);
    assert_eq!(err.message, "Provider returned an empty audio URL");
}

#[test]
fn test_stage_timeouts() {
    let limits = CollaboratorLimits {
        timeout_seconds: 10,
        synthesis_timeout_seconds: 120,
        ..Default::default()
    };

    for stage in [
        StageKind::Upload,
        StageKind::Extract,
        StageKind::Analyze,
        StageKind::GenerateScripts,
    ] {
        assert_eq!(limits.timeout_for(stage), Duration::from_secs(10));
    }
    assert_eq!(limits.timeout_for(StageKind::SynthesizeAudio), Duration::from_secs(120));
    assert_eq!(limits.timeout_for(StageKind::SynthesizeVideo), Duration::from_secs(120));
}

#[test]
fn test_limits_yaml_parsing() {
    let yaml = r#"
max_document_bytes: 1048576
timeout_seconds: 15
"#;

    let limits: CollaboratorLimits = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(limits.max_document_bytes, 1_048_576);
    assert_eq!(limits.timeout_seconds, 15);

    // Unspecified fields keep their defaults
    assert_eq!(limits.synthesis_timeout_seconds, 300);
    assert_eq!(limits.min_text_chars, 100);
}

#[test]
fn test_limits_default_values() {
    let limits = CollaboratorLimits::default();

    assert_eq!(limits.max_document_bytes, 50 * 1024 * 1024);
    assert_eq!(limits.timeout_seconds, 30);
    assert_eq!(limits.min_text_chars, 100);
}
