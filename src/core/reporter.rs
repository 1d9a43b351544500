//! Progress and notification reporting.
//!
//! The reporter listens to the orchestrator's event stream and turns it into
//! two channels:
//! - a rolling log of short status lines (last 5 kept), with canned messages
//!   at 25/50/75% of each stage
//! - milestone notices at 25/50/75/100% overall progress, each emitted at
//!   most once per run

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{PipelineEvent, PipelineEventType, StageKind};

/// Number of status lines retained
pub const STATUS_LOG_CAPACITY: usize = 5;

/// Overall-progress thresholds that trigger notifications
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// Intra-stage thresholds with canned status messages
const STAGE_THRESHOLDS: [u8; 3] = [25, 50, 75];

/// Canned message for a stage reaching a threshold
fn stage_message(stage: StageKind, threshold: u8) -> &'static str {
    match (stage, threshold) {
        (StageKind::Upload, 25) => "Checking the document",
        (StageKind::Upload, 50) => "Fingerprinting the upload",
        (StageKind::Upload, _) => "Handing the document to storage",
        (StageKind::Extract, 25) => "Reading document pages",
        (StageKind::Extract, 50) => "Extracting text content",
        (StageKind::Extract, _) => "Checking extracted text",
        (StageKind::Analyze, 25) => "Identifying key financial metrics",
        (StageKind::Analyze, 50) => "Analyzing performance trends",
        (StageKind::Analyze, _) => "Summarizing highlights and risks",
        (StageKind::GenerateScripts, 25) => "Drafting the narration script",
        (StageKind::GenerateScripts, 50) => "Writing alternative versions",
        (StageKind::GenerateScripts, _) => "Polishing the script",
        (StageKind::SynthesizeAudio, 25) => "Preparing the voice",
        (StageKind::SynthesizeAudio, 50) => "Synthesizing narration",
        (StageKind::SynthesizeAudio, _) => "Finalizing the audio track",
        (StageKind::SynthesizeVideo, 25) => "Preparing the avatar",
        (StageKind::SynthesizeVideo, 50) => "Rendering the avatar video",
        (StageKind::SynthesizeVideo, _) => "Encoding the video",
    }
}

/// A line in the status log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub timestamp: DateTime<Utc>,
    pub stage_id: Option<StageKind>,
    pub message: String,
}

/// Overall progress crossed a milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneNotice {
    pub pipeline_id: Uuid,
    pub subject_id: String,
    pub percent: u8,
    pub message: String,
}

/// Something the reporter wants surfaced
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Status(StatusMessage),
    Milestone(MilestoneNotice),
}

/// Receiver of reporter output (toasts, OS notifications, logs)
pub trait NotificationSink: Send + Sync {
    fn status(&self, message: &StatusMessage);

    fn milestone(&self, notice: &MilestoneNotice);
}

/// Sink that writes everything to the tracing log
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn status(&self, message: &StatusMessage) {
        info!(stage = ?message.stage_id, "{}", message.message);
    }

    fn milestone(&self, notice: &MilestoneNotice) {
        info!(subject = %notice.subject_id, percent = notice.percent, "{}", notice.message);
    }
}

fn milestone_message(percent: u8) -> String {
    match percent {
        100 => "Your report is ready".to_string(),
        p => format!("Processing is {}% complete", p),
    }
}

/// Thresholds already reported for one run
#[derive(Debug, Default)]
struct RunMarks {
    milestones: BTreeSet<u8>,
    stage_thresholds: HashMap<StageKind, BTreeSet<u8>>,
}

/// Translates pipeline events into status lines and milestones.
///
/// One reporter may follow several runs over the same event stream; marks are
/// kept per pipeline id and dropped once that run completes.
#[derive(Debug, Default)]
pub struct Reporter {
    status_log: VecDeque<StatusMessage>,
    runs: HashMap<Uuid, RunMarks>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent status lines, oldest first
    pub fn status_log(&self) -> Vec<StatusMessage> {
        self.status_log.iter().cloned().collect()
    }

    /// Milestones already emitted for a run that has not completed yet
    pub fn milestones_sent(&self, pipeline_id: Uuid) -> Vec<u8> {
        self.runs
            .get(&pipeline_id)
            .map(|marks| marks.milestones.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of runs with marks still held
    pub fn tracked_runs(&self) -> usize {
        self.runs.len()
    }

    /// Process one event, returning the notices it produced
    pub fn observe(&mut self, event: &PipelineEvent) -> Vec<Notice> {
        let mut notices = Vec::new();

        if let Some(message) = self.transition_message(event) {
            notices.push(self.push_status(event.stage_id, message));
        }

        if event.event_type == PipelineEventType::StageProgress {
            if let Some(kind) = event.stage_id {
                for message in self.crossed_stage_thresholds(event, kind) {
                    notices.push(self.push_status(Some(kind), message.to_string()));
                }
            }
        }

        for notice in self.crossed_milestones(event) {
            notices.push(Notice::Milestone(notice));
        }

        if event.event_type == PipelineEventType::PipelineCompleted {
            self.runs.remove(&event.pipeline_id);
        }

        notices
    }

    fn transition_message(&mut self, event: &PipelineEvent) -> Option<String> {
        let stage_name = event
            .stage_id
            .map(|k| k.display_name())
            .unwrap_or("Pipeline");

        match event.event_type {
            PipelineEventType::PipelineStarted => Some("Processing started".to_string()),
            PipelineEventType::StageStarted => {
                if let Some(kind) = event.stage_id {
                    if let Some(marks) = self.runs.get_mut(&event.pipeline_id) {
                        marks.stage_thresholds.remove(&kind);
                    }
                }
                Some(format!("{} started", stage_name))
            }
            PipelineEventType::StageProgress => None,
            PipelineEventType::StageCompleted => Some(format!("{} complete", stage_name)),
            PipelineEventType::StageFailed => Some(format!(
                "{} failed: {}",
                stage_name,
                event.error.as_deref().unwrap_or("unknown error")
            )),
            PipelineEventType::VideoDegraded => Some(
                "Video unavailable; continuing with script, audio and data".to_string(),
            ),
            PipelineEventType::PipelinePaused => Some("Processing paused".to_string()),
            PipelineEventType::PipelineResumed => Some("Processing resumed".to_string()),
            PipelineEventType::StageRetrying => Some(format!("Retrying {}", stage_name)),
            PipelineEventType::PipelineCompleted => Some("Processing complete".to_string()),
            PipelineEventType::PipelineFailed => Some("Processing failed".to_string()),
        }
    }

    fn crossed_stage_thresholds(&mut self, event: &PipelineEvent, kind: StageKind) -> Vec<&'static str> {
        let Some(stage) = event.snapshot.stage(kind) else {
            return Vec::new();
        };

        let sent = self
            .runs
            .entry(event.pipeline_id)
            .or_default()
            .stage_thresholds
            .entry(kind)
            .or_default();
        STAGE_THRESHOLDS
            .iter()
            .filter(|t| stage.progress >= **t && sent.insert(**t))
            .map(|t| stage_message(kind, *t))
            .collect()
    }

    fn crossed_milestones(&mut self, event: &PipelineEvent) -> Vec<MilestoneNotice> {
        let overall = event.snapshot.overall_progress;
        let sent = &mut self.runs.entry(event.pipeline_id).or_default().milestones;
        let mut notices = Vec::new();

        for percent in MILESTONES {
            if overall >= percent as f64 && sent.insert(percent) {
                notices.push(MilestoneNotice {
                    pipeline_id: event.pipeline_id,
                    subject_id: event.subject_id.clone(),
                    percent,
                    message: milestone_message(percent),
                });
            }
        }

        notices
    }

    fn push_status(&mut self, stage_id: Option<StageKind>, message: String) -> Notice {
        let status = StatusMessage {
            timestamp: Utc::now(),
            stage_id,
            message,
        };

        self.status_log.push_back(status.clone());
        while self.status_log.len() > STATUS_LOG_CAPACITY {
            self.status_log.pop_front();
        }

        Notice::Status(status)
    }

    /// Consume an event stream until it closes, forwarding notices to `sink`
    pub fn spawn(
        mut self,
        mut events: broadcast::Receiver<PipelineEvent>,
        sink: Arc<dyn NotificationSink>,
    ) -> JoinHandle<Reporter> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        for notice in self.observe(&event) {
                            match notice {
                                Notice::Status(ref status) => sink.status(status),
                                Notice::Milestone(ref milestone) => sink.milestone(milestone),
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reporter fell behind; skipped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentType, Pipeline, PipelineStatus};

    fn event(event_type: PipelineEventType, stage: Option<StageKind>, pipeline: &Pipeline) -> PipelineEvent {
        PipelineEvent::new(event_type, stage, String::new(), pipeline.clone())
    }

    fn status_messages(notices: &[Notice]) -> Vec<String> {
        notices
            .iter()
            .filter_map(|n| match n {
                Notice::Status(s) => Some(s.message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_stage_thresholds_emit_canned_messages_once() {
        let mut reporter = Reporter::new();
        let mut pipeline = Pipeline::new("p", DocumentType::Quarterly);
        pipeline.set_status(PipelineStatus::Processing);
        pipeline.stages[0].start();

        pipeline.stages[0].advance(30);
        let notices = reporter.observe(&event(
            PipelineEventType::StageProgress,
            Some(StageKind::Upload),
            &pipeline,
        ));
        assert_eq!(status_messages(&notices), vec!["Checking the document"]);

        // Same threshold again: nothing new
        pipeline.stages[0].advance(35);
        let notices = reporter.observe(&event(
            PipelineEventType::StageProgress,
            Some(StageKind::Upload),
            &pipeline,
        ));
        assert!(status_messages(&notices).is_empty());

        // Jumping past two thresholds emits both, in order
        pipeline.stages[0].advance(80);
        let notices = reporter.observe(&event(
            PipelineEventType::StageProgress,
            Some(StageKind::Upload),
            &pipeline,
        ));
        assert_eq!(
            status_messages(&notices),
            vec!["Fingerprinting the upload", "Handing the document to storage"]
        );
    }

    #[test]
    fn test_status_log_keeps_last_five() {
        let mut reporter = Reporter::new();
        let pipeline = Pipeline::new("p", DocumentType::Board);

        for kind in StageKind::ALL {
            reporter.observe(&event(PipelineEventType::StageStarted, Some(kind), &pipeline));
        }

        let log = reporter.status_log();
        assert_eq!(log.len(), STATUS_LOG_CAPACITY);
        assert_eq!(log[0].message, "Text Extraction started");
        assert_eq!(log[4].message, "Video Generation started");
    }

    #[test]
    fn test_milestones_are_not_duplicated() {
        let mut reporter = Reporter::new();
        let mut pipeline = Pipeline::new("p", DocumentType::Quarterly);
        pipeline.set_status(PipelineStatus::Processing);

        // 2 of 6 stages complete = 33%
        pipeline.stages[0].complete();
        pipeline.stages[1].complete();
        pipeline.refresh_derived();

        let first = reporter.observe(&event(PipelineEventType::StageCompleted, Some(StageKind::Extract), &pipeline));
        let milestones: Vec<u8> = first
            .iter()
            .filter_map(|n| match n {
                Notice::Milestone(m) => Some(m.percent),
                _ => None,
            })
            .collect();
        assert_eq!(milestones, vec![25]);

        let again = reporter.observe(&event(PipelineEventType::StageProgress, Some(StageKind::Analyze), &pipeline));
        assert!(!again.iter().any(|n| matches!(n, Notice::Milestone(_))));

        for stage in pipeline.stages.iter_mut() {
            stage.complete();
        }
        pipeline.set_status(PipelineStatus::Completed);
        let last = reporter.observe(&event(PipelineEventType::PipelineCompleted, None, &pipeline));
        let milestones: Vec<u8> = last
            .iter()
            .filter_map(|n| match n {
                Notice::Milestone(m) => Some(m.percent),
                _ => None,
            })
            .collect();
        assert_eq!(milestones, vec![50, 75, 100]);
        assert_eq!(reporter.tracked_runs(), 0);
    }

    fn milestones(notices: &[Notice]) -> Vec<u8> {
        notices
            .iter()
            .filter_map(|n| match n {
                Notice::Milestone(m) => Some(m.percent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_interleaved_runs_keep_their_own_milestones() {
        let mut reporter = Reporter::new();
        let mut a = Pipeline::new("a", DocumentType::Quarterly);
        a.set_status(PipelineStatus::Processing);
        a.stages[0].complete();
        a.stages[1].complete();
        a.refresh_derived();
        let mut b = Pipeline::new("b", DocumentType::Board);
        b.set_status(PipelineStatus::Processing);

        let mut sent_for_a = Vec::new();
        for _ in 0..3 {
            sent_for_a.extend(milestones(&reporter.observe(&event(
                PipelineEventType::StageCompleted,
                Some(StageKind::Extract),
                &a,
            ))));
            reporter.observe(&event(PipelineEventType::StageCompleted, Some(StageKind::Upload), &b));
        }

        assert_eq!(sent_for_a, vec![25]);
        assert_eq!(reporter.milestones_sent(a.id), vec![25]);
        assert!(reporter.milestones_sent(b.id).is_empty());
        assert_eq!(reporter.tracked_runs(), 2);
    }

    #[test]
    fn test_interleaved_runs_keep_their_own_stage_thresholds() {
        let mut reporter = Reporter::new();
        let mut a = Pipeline::new("a", DocumentType::Quarterly);
        a.set_status(PipelineStatus::Processing);
        a.stages[0].start();
        a.stages[0].advance(30);
        let b = Pipeline::new("b", DocumentType::Board);

        let first = reporter.observe(&event(PipelineEventType::StageProgress, Some(StageKind::Upload), &a));
        assert_eq!(status_messages(&first), vec!["Checking the document"]);

        reporter.observe(&event(PipelineEventType::PipelineStarted, None, &b));
        let again = reporter.observe(&event(PipelineEventType::StageProgress, Some(StageKind::Upload), &a));
        assert!(status_messages(&again).is_empty());
    }

    #[test]
    fn test_completed_run_is_forgotten() {
        let mut reporter = Reporter::new();
        let mut first = Pipeline::new("p", DocumentType::Quarterly);
        for stage in first.stages.iter_mut() {
            stage.complete();
        }
        first.refresh_derived();
        let notices = reporter.observe(&event(PipelineEventType::PipelineCompleted, None, &first));
        assert_eq!(milestones(&notices), vec![25, 50, 75, 100]);
        assert_eq!(reporter.tracked_runs(), 0);

        let second = Pipeline::new("p", DocumentType::Quarterly);
        reporter.observe(&event(PipelineEventType::PipelineStarted, None, &second));
        assert!(reporter.milestones_sent(second.id).is_empty());
        assert_eq!(reporter.tracked_runs(), 1);
    }

    #[test]
    fn test_failure_message_includes_error() {
        let mut reporter = Reporter::new();
        let pipeline = Pipeline::new("p", DocumentType::Board);
        let failed = event(PipelineEventType::StageFailed, Some(StageKind::Analyze), &pipeline)
            .with_error("Model overloaded".to_string());

        let notices = reporter.observe(&failed);
        assert_eq!(status_messages(&notices), vec!["AI Analysis failed: Model overloaded"]);
    }
}
