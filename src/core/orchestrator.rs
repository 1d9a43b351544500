//! Pipeline orchestrator.
//!
//! Drives the six stages strictly in order on a spawned task, ticks simulated
//! progress while each collaborator call is in flight, persists a snapshot
//! after every transition and publishes every change as a `PipelineEvent`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    CollaboratorError, CollaboratorErrorKind, CollaboratorLimits, Collaborators, VoiceSettings,
};
use crate::domain::{
    AnalysisOutput, AudioOutput, Document, DocumentType, ExtractedText, Pipeline, PipelineEvent,
    PipelineEventType, PipelineResult, PipelineStatus, RunArtifacts, ScriptOutput, StageKind,
    StageStatus, UploadReceipt, VideoResult,
};
use crate::error::PipelineError;

use super::estimator::{ProgressEstimator, RandomEstimator};
use super::snapshot_store::SnapshotStore;

/// Buffered events per subscriber before it starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Per-orchestrator settings for collaborator calls
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub limits: CollaboratorLimits,

    pub voice_id: String,

    pub voice_settings: VoiceSettings,

    /// Without an avatar the video stage degrades to a placeholder
    pub avatar_id: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            limits: CollaboratorLimits::default(),
            voice_id: "narrator".to_string(),
            voice_settings: VoiceSettings::default(),
            avatar_id: None,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed {
        pipeline: Pipeline,
        result: PipelineResult,
    },
    Failed {
        pipeline: Pipeline,
        stage_id: StageKind,
        error_message: String,
    },
    Paused {
        pipeline: Pipeline,
    },
}

impl RunOutcome {
    /// Final pipeline state
    pub fn pipeline(&self) -> &Pipeline {
        match self {
            RunOutcome::Completed { pipeline, .. }
            | RunOutcome::Failed { pipeline, .. }
            | RunOutcome::Paused { pipeline } => pipeline,
        }
    }

    pub fn into_pipeline(self) -> Pipeline {
        match self {
            RunOutcome::Completed { pipeline, .. }
            | RunOutcome::Failed { pipeline, .. }
            | RunOutcome::Paused { pipeline } => pipeline,
        }
    }
}

type SharedPipeline = Arc<Mutex<Pipeline>>;

/// Cloneable pause handle for a running pipeline
#[derive(Clone)]
pub struct RunControl {
    state: SharedPipeline,
    cancel: CancellationToken,
}

impl RunControl {
    /// Current pipeline state
    pub async fn snapshot(&self) -> Pipeline {
        self.state.lock().await.clone()
    }

    /// Pause the run. The in-flight stage keeps its recorded progress and its
    /// pending collaborator call is abandoned.
    pub async fn pause(&self) -> Result<Pipeline, PipelineError> {
        let mut pipeline = self.state.lock().await;
        if pipeline.status != PipelineStatus::Processing {
            return Err(PipelineError::invalid_state("pause", pipeline.status));
        }

        pipeline.set_status(PipelineStatus::Paused);
        self.cancel.cancel();
        info!(pipeline_id = %pipeline.id, stage_index = pipeline.current_stage_index, "Pause requested");

        Ok(pipeline.clone())
    }
}

/// Handle to a running pipeline
pub struct PipelineRun {
    control: RunControl,
    task: JoinHandle<RunOutcome>,
    launched: Pipeline,
}

impl PipelineRun {
    /// Pipeline as it was when the run was launched
    pub fn launched(&self) -> &Pipeline {
        &self.launched
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.launched.id
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub async fn snapshot(&self) -> Pipeline {
        self.control.snapshot().await
    }

    pub async fn pause(&self) -> Result<Pipeline, PipelineError> {
        self.control.pause().await
    }

    /// Wait for the run to complete, fail or settle into `paused`
    pub async fn wait(self) -> Result<RunOutcome, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Interrupted(e.to_string()))
    }
}

/// Output of one stage, before it is recorded on the pipeline
enum StageOutput {
    Upload(UploadReceipt),
    Extraction(ExtractedText),
    Analysis(AnalysisOutput),
    Scripts(ScriptOutput),
    Audio(AudioOutput),
    Video(VideoResult),
}

impl StageOutput {
    fn record(self, artifacts: &mut RunArtifacts) {
        match self {
            StageOutput::Upload(receipt) => artifacts.upload = Some(receipt),
            StageOutput::Extraction(text) => artifacts.extraction = Some(text),
            StageOutput::Analysis(analysis) => artifacts.analysis = Some(analysis),
            StageOutput::Scripts(scripts) => artifacts.scripts = Some(scripts),
            StageOutput::Audio(audio) => artifacts.audio = Some(audio),
            StageOutput::Video(video) => artifacts.video = Some(video),
        }
    }
}

fn prerequisite<'a, T>(
    value: Option<&'a T>,
    what: &str,
) -> Result<&'a T, CollaboratorError> {
    value.ok_or_else(|| {
        CollaboratorError::invalid_output(format!("Missing {} from an earlier stage", what))
    })
}

/// Main pipeline orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    collaborators: Collaborators,
    store: Arc<dyn SnapshotStore>,
    estimator: Arc<dyn ProgressEstimator>,
    settings: Arc<OrchestratorSettings>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Orchestrator {
    /// Create an orchestrator with default settings and randomized progress
    pub fn new(collaborators: Collaborators, store: Arc<dyn SnapshotStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            collaborators,
            store,
            estimator: Arc::new(RandomEstimator::default()),
            settings: Arc::new(OrchestratorSettings::default()),
            events,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn ProgressEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Receive every pipeline update published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Start a new pipeline for `document`
    #[instrument(skip(self, document), fields(subject = %document.subject_id, document_type = %document_type))]
    pub async fn start(
        &self,
        document: Document,
        document_type: DocumentType,
    ) -> Result<PipelineRun, PipelineError> {
        document.validate()?;

        let mut pipeline = Pipeline::new(document.subject_id.clone(), document_type);
        info!(pipeline_id = %pipeline.id, size_bytes = document.size_bytes(), "Starting pipeline");

        // Intake rejects oversized documents; keep them off disk
        if let Err(e) = self.settings.limits.validate_document(&document) {
            debug!(error = %e, "Document not persisted");
        } else if let Err(e) = self.store.save_document(&document).await {
            warn!(error = %e, "Failed to persist document; the run cannot be resumed after a restart");
        }

        pipeline.set_status(PipelineStatus::Processing);
        self.emit(PipelineEvent::new(
            PipelineEventType::PipelineStarted,
            None,
            format!("Processing {} report '{}'", document_type, document.file_name),
            pipeline.clone(),
        ));

        self.launch(pipeline, Some(document)).await
    }

    /// Start from loosely typed input, rejecting it before any pipeline exists
    pub async fn submit(
        &self,
        document: Option<Document>,
        document_type: &str,
    ) -> Result<PipelineRun, PipelineError> {
        let document =
            document.ok_or_else(|| PipelineError::Validation("no document provided".to_string()))?;
        let document_type: DocumentType = document_type.parse()?;
        self.start(document, document_type).await
    }

    /// Continue a paused pipeline from its current stage
    #[instrument(skip(self, pipeline), fields(pipeline_id = %pipeline.id, subject = %pipeline.subject_id))]
    pub async fn resume(&self, mut pipeline: Pipeline) -> Result<PipelineRun, PipelineError> {
        if pipeline.status != PipelineStatus::Paused {
            return Err(PipelineError::invalid_state("resume", pipeline.status));
        }

        info!(stage_index = pipeline.current_stage_index, "Resuming pipeline");
        pipeline.set_status(PipelineStatus::Processing);
        self.emit(PipelineEvent::new(
            PipelineEventType::PipelineResumed,
            pipeline.current_stage().map(|s| s.id),
            "Processing resumed".to_string(),
            pipeline.clone(),
        ));

        self.launch(pipeline, None).await
    }

    /// Reset the failed stage and continue from it
    #[instrument(skip(self, pipeline), fields(pipeline_id = %pipeline.id, subject = %pipeline.subject_id))]
    pub async fn retry_failed_stage(
        &self,
        mut pipeline: Pipeline,
    ) -> Result<PipelineRun, PipelineError> {
        if pipeline.status != PipelineStatus::Failed {
            return Err(PipelineError::invalid_state("retry", pipeline.status));
        }

        let index = pipeline.current_stage_index;
        let stage = pipeline.stages.get_mut(index).ok_or_else(|| {
            PipelineError::Validation(format!("Pipeline has no stage at index {}", index))
        })?;
        let kind = stage.id;
        stage.reset();

        info!(stage = %kind, "Retrying failed stage");
        pipeline.set_status(PipelineStatus::Processing);
        self.emit(PipelineEvent::new(
            PipelineEventType::StageRetrying,
            Some(kind),
            format!("Retrying {}", kind.display_name()),
            pipeline.clone(),
        ));

        self.launch(pipeline, None).await
    }

    /// Rehydrate the persisted pipeline for `subject_id`.
    ///
    /// A snapshot still marked processing was interrupted by a restart and
    /// comes back paused.
    #[instrument(skip(self))]
    pub async fn restore(&self, subject_id: &str) -> Result<Option<Pipeline>, PipelineError> {
        let Some(mut pipeline) = self.store.load(subject_id).await? else {
            debug!("No persisted pipeline");
            return Ok(None);
        };

        if matches!(
            pipeline.status,
            PipelineStatus::Processing | PipelineStatus::Queued
        ) {
            info!(pipeline_id = %pipeline.id, "Interrupted pipeline restored as paused");
            pipeline.set_status(PipelineStatus::Paused);
            self.persist(&pipeline).await;
        }

        Ok(Some(pipeline))
    }

    /// Persisted pipeline for `subject_id`, as stored
    pub async fn load(&self, subject_id: &str) -> Result<Option<Pipeline>, PipelineError> {
        self.store.load(subject_id).await
    }

    /// Every persisted pipeline, most recently updated first
    pub async fn runs(&self) -> Result<Vec<Pipeline>, PipelineError> {
        self.store.list().await
    }

    /// Begin the current stage and hand the pipeline to a driver task
    async fn launch(
        &self,
        mut pipeline: Pipeline,
        document: Option<Document>,
    ) -> Result<PipelineRun, PipelineError> {
        let index = pipeline.current_stage_index;
        let stage = pipeline.stages.get_mut(index).ok_or_else(|| {
            PipelineError::Validation(format!("Pipeline has no stage at index {}", index))
        })?;

        // A paused stage keeps its progress; anything else starts over
        let restarted = stage.is_processing();
        if restarted {
            stage.restart();
        } else {
            stage.start();
        }
        let kind = stage.id;
        pipeline.refresh_derived();

        self.persist(&pipeline).await;
        if restarted {
            info!(pipeline_id = %pipeline.id, stage = %kind, "Stage restarted");
        } else {
            info!(pipeline_id = %pipeline.id, stage = %kind, "Stage started");
            self.emit(PipelineEvent::new(
                PipelineEventType::StageStarted,
                Some(kind),
                format!("{} started", kind.display_name()),
                pipeline.clone(),
            ));
        }

        let launched = pipeline.clone();
        let state = Arc::new(Mutex::new(pipeline));
        let control = CancellationToken::new();
        let task = tokio::spawn(self.clone().drive(state.clone(), control.clone(), document));

        Ok(PipelineRun {
            control: RunControl {
                state,
                cancel: control,
            },
            task,
            launched,
        })
    }

    /// Stage loop. Runs until the pipeline completes, fails or is paused.
    async fn drive(
        self,
        state: SharedPipeline,
        control: CancellationToken,
        mut document: Option<Document>,
    ) -> RunOutcome {
        loop {
            let (index, kind, subject_id, document_type, artifacts) = {
                let mut pipeline = state.lock().await;
                if pipeline.status == PipelineStatus::Paused {
                    let snapshot = pipeline.clone();
                    drop(pipeline);
                    return self.settle_paused(snapshot).await;
                }

                // Index is checked in launch and only advanced below the last stage
                let index = pipeline.current_stage_index;
                let stage = &mut pipeline.stages[index];
                let kind = stage.id;

                if stage.status != StageStatus::Processing {
                    stage.start();
                    pipeline.refresh_derived();
                    info!(pipeline_id = %pipeline.id, stage = %kind, "Stage started");
                    let snapshot = pipeline.clone();
                    self.emit(PipelineEvent::new(
                        PipelineEventType::StageStarted,
                        Some(kind),
                        format!("{} started", kind.display_name()),
                        snapshot.clone(),
                    ));
                    drop(pipeline);
                    self.persist(&snapshot).await;
                    (
                        index,
                        kind,
                        snapshot.subject_id,
                        snapshot.document_type,
                        snapshot.artifacts,
                    )
                } else {
                    (
                        index,
                        kind,
                        pipeline.subject_id.clone(),
                        pipeline.document_type,
                        pipeline.artifacts.clone(),
                    )
                }
            };

            let ticks = control.child_token();
            let ticker = tokio::spawn(self.clone().tick_progress(
                state.clone(),
                index,
                kind,
                ticks.clone(),
            ));

            let result = self
                .run_stage(
                    kind,
                    &subject_id,
                    document_type,
                    &artifacts,
                    &mut document,
                    &control,
                )
                .await;

            ticks.cancel();
            if let Err(e) = ticker.await {
                warn!(error = %e, "Progress ticker ended abnormally");
            }

            let mut pipeline = state.lock().await;

            // Whatever arrives after a pause is discarded; the stage reruns on resume
            if pipeline.status == PipelineStatus::Paused {
                let snapshot = pipeline.clone();
                drop(pipeline);
                return self.settle_paused(snapshot).await;
            }

            let output = match result {
                Ok(output) => output,
                Err(e) if kind == StageKind::SynthesizeVideo => {
                    warn!(error = %e, "Video synthesis failed; substituting placeholder");
                    self.emit(
                        PipelineEvent::new(
                            PipelineEventType::VideoDegraded,
                            Some(kind),
                            "Video unavailable; continuing without it".to_string(),
                            pipeline.clone(),
                        )
                        .with_error(e.to_string()),
                    );
                    StageOutput::Video(VideoResult::Placeholder { reason: e.message })
                }
                Err(e) => {
                    let snapshot = self.mark_failed(&mut pipeline, index, e.to_string());
                    drop(pipeline);
                    return self.settle_failed(snapshot, kind, e.to_string()).await;
                }
            };

            output.record(&mut pipeline.artifacts);

            if pipeline.is_last_stage() {
                let Some(result) = pipeline.artifacts.result() else {
                    let message = "Outputs from earlier stages are missing".to_string();
                    let snapshot = self.mark_failed(&mut pipeline, index, message.clone());
                    drop(pipeline);
                    return self.settle_failed(snapshot, kind, message).await;
                };

                pipeline.stages[index].complete();
                pipeline.set_status(PipelineStatus::Completed);
                let snapshot = pipeline.clone();
                self.emit(PipelineEvent::new(
                    PipelineEventType::StageCompleted,
                    Some(kind),
                    format!("{} complete", kind.display_name()),
                    snapshot.clone(),
                ));
                self.emit(PipelineEvent::new(
                    PipelineEventType::PipelineCompleted,
                    None,
                    "Processing complete".to_string(),
                    snapshot.clone(),
                ));
                drop(pipeline);
                return self.settle_completed(snapshot, result).await;
            }

            pipeline.stages[index].complete();
            pipeline.current_stage_index += 1;
            pipeline.refresh_derived();
            info!(
                pipeline_id = %pipeline.id,
                stage = %kind,
                overall = pipeline.overall_progress,
                "Stage completed"
            );

            let snapshot = pipeline.clone();
            self.emit(PipelineEvent::new(
                PipelineEventType::StageCompleted,
                Some(kind),
                format!("{} complete", kind.display_name()),
                snapshot.clone(),
            ));
            drop(pipeline);
            self.persist(&snapshot).await;
        }
    }

    /// Simulated progress for the stage at `index` until `ticks` is cancelled
    async fn tick_progress(
        self,
        state: SharedPipeline,
        index: usize,
        kind: StageKind,
        ticks: CancellationToken,
    ) {
        loop {
            let interval = {
                let pipeline = state.lock().await;
                match pipeline.stages.get(index) {
                    Some(stage) => self.estimator.tick_interval(stage),
                    None => return,
                }
            };

            tokio::select! {
                _ = ticks.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            let mut pipeline = state.lock().await;
            if ticks.is_cancelled()
                || pipeline.status != PipelineStatus::Processing
                || pipeline.current_stage_index != index
            {
                return;
            }

            let Some(stage) = pipeline.stages.get_mut(index) else {
                return;
            };
            if !stage.is_processing() {
                return;
            }

            let next = self.estimator.next_progress(stage);
            if stage.advance(next) {
                let progress = stage.progress;
                pipeline.refresh_derived();
                self.emit(PipelineEvent::new(
                    PipelineEventType::StageProgress,
                    Some(kind),
                    format!("{} at {}%", kind.display_name(), progress),
                    pipeline.clone(),
                ));
            }
        }
    }

    /// Invoke the collaborator behind `kind` and validate what comes back
    async fn run_stage(
        &self,
        kind: StageKind,
        subject_id: &str,
        document_type: DocumentType,
        artifacts: &RunArtifacts,
        document: &mut Option<Document>,
        control: &CancellationToken,
    ) -> Result<StageOutput, CollaboratorError> {
        let limits = &self.settings.limits;
        let audience = document_type.audience();

        match kind {
            StageKind::Upload => {
                let document = self.document_for(subject_id, document).await?;
                limits.validate_document(document)?;
                let receipt = self
                    .guarded(kind, control, self.collaborators.document.upload(document))
                    .await?;
                debug!(fingerprint = %receipt.fingerprint, "Document accepted");
                Ok(StageOutput::Upload(receipt))
            }
            StageKind::Extract => {
                let document = self.document_for(subject_id, document).await?;
                limits.validate_document(document)?;
                let text = self
                    .guarded(kind, control, self.collaborators.document.extract_text(document))
                    .await?;
                limits.validate_extracted(&text)?;
                debug!(words = text.word_count, "Text extracted");
                Ok(StageOutput::Extraction(text))
            }
            StageKind::Analyze => {
                let text = prerequisite(artifacts.extraction.as_ref(), "extracted text")?;
                let analysis = self
                    .guarded(
                        kind,
                        control,
                        self.collaborators
                            .analysis
                            .analyze(&text.content, document_type, audience),
                    )
                    .await?;
                Ok(StageOutput::Analysis(analysis))
            }
            StageKind::GenerateScripts => {
                let analysis = prerequisite(artifacts.analysis.as_ref(), "analysis")?;
                let scripts = self
                    .guarded(
                        kind,
                        control,
                        self.collaborators
                            .analysis
                            .generate_scripts(analysis, document_type, audience),
                    )
                    .await?;
                limits.require_text("script", &scripts.primary)?;
                Ok(StageOutput::Scripts(scripts))
            }
            StageKind::SynthesizeAudio => {
                let scripts = prerequisite(artifacts.scripts.as_ref(), "script")?;
                let audio = self
                    .guarded(
                        kind,
                        control,
                        self.collaborators.audio.synthesize_audio(
                            &scripts.primary,
                            &self.settings.voice_id,
                            &self.settings.voice_settings,
                        ),
                    )
                    .await?;
                limits.require_text("audio URL", &audio.audio_url)?;
                Ok(StageOutput::Audio(audio))
            }
            StageKind::SynthesizeVideo => {
                let scripts = prerequisite(artifacts.scripts.as_ref(), "script")?;
                let Some(avatar_id) = self.settings.avatar_id.as_deref() else {
                    return Err(CollaboratorError::rejected("No avatar is configured"));
                };
                let video = self
                    .guarded(
                        kind,
                        control,
                        self.collaborators
                            .video
                            .synthesize_video(&scripts.primary, avatar_id),
                    )
                    .await?;
                limits.require_text("video URL", &video.video_url)?;
                Ok(StageOutput::Video(VideoResult::Generated(video)))
            }
        }
    }

    /// Race a collaborator call against pause and the stage timeout
    async fn guarded<T, F>(
        &self,
        kind: StageKind,
        control: &CancellationToken,
        call: F,
    ) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let limit = self.settings.limits.timeout_for(kind);
        debug!(stage = %kind, timeout_secs = limit.as_secs(), "Calling collaborator");

        tokio::select! {
            biased;
            _ = control.cancelled() => Err(CollaboratorError::new(
                CollaboratorErrorKind::Cancelled,
                format!("{} was interrupted by a pause", kind.display_name()),
            )),
            result = tokio::time::timeout(limit, call) => match result {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::new(
                    CollaboratorErrorKind::Timeout,
                    format!(
                        "{} timed out after {} seconds",
                        kind.display_name(),
                        limit.as_secs()
                    ),
                )),
            },
        }
    }

    /// The run's document, loaded from the store after a restart
    async fn document_for<'a>(
        &self,
        subject_id: &str,
        cached: &'a mut Option<Document>,
    ) -> Result<&'a Document, CollaboratorError> {
        if cached.is_none() {
            *cached = self.store.load_document(subject_id).await.map_err(|e| {
                CollaboratorError::rejected(format!("Could not load the uploaded document: {}", e))
            })?;
        }

        cached.as_ref().ok_or_else(|| {
            CollaboratorError::rejected(
                "The uploaded document is no longer available; start a new run",
            )
        })
    }

    fn mark_failed(&self, pipeline: &mut Pipeline, index: usize, message: String) -> Pipeline {
        let kind = pipeline.stages[index].id;
        pipeline.stages[index].fail(message.clone());
        pipeline.set_status(PipelineStatus::Failed);
        error!(pipeline_id = %pipeline.id, stage = %kind, error = %message, "Stage failed");

        let snapshot = pipeline.clone();
        self.emit(
            PipelineEvent::new(
                PipelineEventType::StageFailed,
                Some(kind),
                format!("{} failed", kind.display_name()),
                snapshot.clone(),
            )
            .with_error(message.clone()),
        );
        self.emit(
            PipelineEvent::new(
                PipelineEventType::PipelineFailed,
                Some(kind),
                "Processing failed".to_string(),
                snapshot.clone(),
            )
            .with_error(message),
        );
        snapshot
    }

    async fn settle_paused(&self, pipeline: Pipeline) -> RunOutcome {
        info!(
            pipeline_id = %pipeline.id,
            stage_index = pipeline.current_stage_index,
            "Pipeline paused"
        );
        self.persist(&pipeline).await;
        self.emit(PipelineEvent::new(
            PipelineEventType::PipelinePaused,
            pipeline.current_stage().map(|s| s.id),
            "Processing paused".to_string(),
            pipeline.clone(),
        ));
        RunOutcome::Paused { pipeline }
    }

    async fn settle_failed(
        &self,
        pipeline: Pipeline,
        stage_id: StageKind,
        error_message: String,
    ) -> RunOutcome {
        self.persist(&pipeline).await;
        RunOutcome::Failed {
            pipeline,
            stage_id,
            error_message,
        }
    }

    async fn settle_completed(&self, pipeline: Pipeline, result: PipelineResult) -> RunOutcome {
        info!(
            pipeline_id = %pipeline.id,
            video_placeholder = result.video.is_placeholder(),
            "Pipeline completed"
        );

        // Persist-then-clear: a crash in between leaves a completed snapshot
        self.persist(&pipeline).await;
        if let Err(e) = self.store.delete(&pipeline.subject_id).await {
            warn!(error = %e, "Failed to clear completed pipeline snapshot");
        }

        RunOutcome::Completed { pipeline, result }
    }

    async fn persist(&self, pipeline: &Pipeline) {
        if let Err(e) = self.store.save(pipeline).await {
            warn!(pipeline_id = %pipeline.id, error = %e, "Failed to persist pipeline snapshot");
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        AnalysisCollaborator, AudioCollaborator, DocumentCollaborator, VideoCollaborator,
    };
    use crate::core::estimator::FixedIncrementEstimator;
    use crate::core::snapshot_store::MemorySnapshotStore;
    use crate::domain::{Audience, FinancialData, VideoOutput};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Happy;

    #[async_trait]
    impl DocumentCollaborator for Happy {
        fn name(&self) -> &str {
            "happy"
        }

        async fn extract_text(&self, _document: &Document) -> Result<ExtractedText, CollaboratorError> {
            Ok(ExtractedText::from_content("Revenue grew twelve percent. ".repeat(10)))
        }
    }

    #[async_trait]
    impl AnalysisCollaborator for Happy {
        fn name(&self) -> &str {
            "happy"
        }

        async fn analyze(
            &self,
            _text: &str,
            _document_type: DocumentType,
            _audience: Audience,
        ) -> Result<AnalysisOutput, CollaboratorError> {
            Ok(AnalysisOutput {
                script_text: "Welcome to the quarter in review.".to_string(),
                script_alternatives: vec![],
                financial_data: FinancialData::default(),
            })
        }
    }

    #[async_trait]
    impl AudioCollaborator for Happy {
        fn name(&self) -> &str {
            "happy"
        }

        async fn synthesize_audio(
            &self,
            _script_text: &str,
            _voice_id: &str,
            _voice_settings: &VoiceSettings,
        ) -> Result<AudioOutput, CollaboratorError> {
            Ok(AudioOutput {
                audio_url: "https://cdn.example/audio.mp3".to_string(),
                duration_secs: Some(42.0),
            })
        }
    }

    #[async_trait]
    impl VideoCollaborator for Happy {
        fn name(&self) -> &str {
            "happy"
        }

        async fn synthesize_video(
            &self,
            _script_text: &str,
            _avatar_id: &str,
        ) -> Result<VideoOutput, CollaboratorError> {
            Ok(VideoOutput {
                video_url: "https://cdn.example/video.mp4".to_string(),
                thumbnail_url: None,
                duration_secs: 42.0,
            })
        }
    }

    fn orchestrator(avatar_id: Option<&str>) -> Orchestrator {
        Orchestrator::new(
            Collaborators::from_single(Arc::new(Happy)),
            Arc::new(MemorySnapshotStore::new()),
        )
        .with_estimator(Arc::new(FixedIncrementEstimator::new(
            Duration::from_millis(5),
            10,
        )))
        .with_settings(OrchestratorSettings {
            avatar_id: avatar_id.map(str::to_string),
            ..OrchestratorSettings::default()
        })
    }

    fn document() -> Document {
        Document::new("proj-1", "q3.pdf", b"%PDF-1.7 quarterly".to_vec())
    }

    #[tokio::test]
    async fn test_happy_path_completes() {
        let run = orchestrator(Some("avatar-1"))
            .start(document(), DocumentType::Quarterly)
            .await
            .unwrap();

        match run.wait().await.unwrap() {
            RunOutcome::Completed { pipeline, result } => {
                assert_eq!(pipeline.overall_progress, 100.0);
                assert_eq!(pipeline.estimated_time_remaining_ms, 0);
                assert_eq!(result.video_url(), Some("https://cdn.example/video.mp4"));
                assert_eq!(result.audio_url, "https://cdn.example/audio.mp3");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_avatar_degrades_video() {
        let run = orchestrator(None)
            .start(document(), DocumentType::Board)
            .await
            .unwrap();

        match run.wait().await.unwrap() {
            RunOutcome::Completed { pipeline, result } => {
                assert!(result.video.is_placeholder());
                assert!(pipeline.stages[5].is_completed());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_input() {
        let orchestrator = orchestrator(None);

        let err = orchestrator.submit(None, "quarterly").await.err().unwrap();
        assert!(matches!(err, PipelineError::Validation(_)));

        let err = orchestrator
            .submit(Some(document()), "annual")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn test_outcome_exposes_pipeline() {
        let pipeline = Pipeline::new("p", DocumentType::Quarterly);
        let outcome = RunOutcome::Paused {
            pipeline: pipeline.clone(),
        };
        assert_eq!(outcome.pipeline().id, pipeline.id);
        assert_eq!(outcome.into_pipeline(), pipeline);
    }
}
