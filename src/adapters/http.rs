//! HTTP collaborator backed by the hosted serverless functions.
//!
//! Each function is a thin proxy to one provider (text extraction, AI
//! analysis, text-to-speech, avatar video) answering with a
//! `{ success, ..., error }` envelope. The envelopes are decoded here and
//! turned into typed results; nothing untyped crosses into the core.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    scripts_from_analysis, AnalysisCollaborator, AudioCollaborator, CollaboratorError,
    CollaboratorErrorKind, CollaboratorLimits, DocumentCollaborator, VideoCollaborator,
    VoiceSettings,
};
use crate::domain::{
    AnalysisOutput, Audience, AudioOutput, Document, DocumentType, ExtractedText, FinancialData,
    ScriptOutput, StageKind, VideoOutput,
};

/// Where the serverless functions live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Prefix for relative endpoint paths
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_extract")]
    pub extract: String,

    #[serde(default = "default_analyze")]
    pub analyze: String,

    /// Dedicated script endpoint; without one the analysis draft is used
    #[serde(default)]
    pub scripts: Option<String>,

    #[serde(default = "default_audio")]
    pub audio: String,

    #[serde(default = "default_video")]
    pub video: String,
}

fn default_base_url() -> String {
    "http://localhost:8888/api".to_string()
}
fn default_extract() -> String {
    "extract-text".to_string()
}
fn default_analyze() -> String {
    "analyze-document".to_string()
}
fn default_audio() -> String {
    "text-to-speech".to_string()
}
fn default_video() -> String {
    "generate-video".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            extract: default_extract(),
            analyze: default_analyze(),
            scripts: None,
            audio: default_audio(),
            video: default_video(),
        }
    }
}

impl EndpointConfig {
    /// Resolve an endpoint against the base URL (absolute URLs pass through)
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        }
    }
}

/// Collaborator for all stages over HTTP
pub struct HttpCollaborator {
    endpoints: EndpointConfig,
    limits: CollaboratorLimits,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCollaborator {
    pub fn new(endpoints: EndpointConfig, limits: CollaboratorLimits) -> Self {
        Self {
            endpoints,
            limits,
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn headers(&self, content_type: &'static str) -> Result<HeaderMap, CollaboratorError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(ref key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| CollaboratorError::transport("API key is not a valid header value"))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn decode<R: DeserializeOwned>(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<R, CollaboratorError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::rejected(format!(
                "{} returned {}: {}",
                url,
                status,
                envelope_error(&body).unwrap_or_else(|| body.trim().to_string())
            )));
        }

        response.json::<R>().await.map_err(|e| {
            CollaboratorError::transport(format!("Unreadable response from {}: {}", url, e))
        })
    }

    async fn post_json<B, R>(
        &self,
        endpoint: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<R, CollaboratorError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoints.url(endpoint);
        debug!(%url, "POST json");

        let response = self
            .client
            .post(&url)
            .headers(self.headers("application/json")?)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(&url, timeout, e))?;

        self.decode(&url, response).await
    }
}

fn request_error(url: &str, timeout: Duration, error: reqwest::Error) -> CollaboratorError {
    if error.is_timeout() {
        CollaboratorError::new(
            CollaboratorErrorKind::Timeout,
            format!("{} did not respond within {}s", url, timeout.as_secs()),
        )
    } else {
        CollaboratorError::transport(format!("Request to {} failed: {}", url, error))
    }
}

/// Pull the `error` field out of an error body, if it is an envelope
fn envelope_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body).ok()?.error
}

/// Turn `success: false` into an error, using the provider's message
fn check_success(success: bool, error: Option<String>, what: &str) -> Result<(), CollaboratorError> {
    if success {
        Ok(())
    } else {
        Err(CollaboratorError::rejected(
            error.unwrap_or_else(|| format!("{} failed without an error message", what)),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractResponse {
    success: bool,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    word_count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    text: &'a str,
    document_type: &'a str,
    audience: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    success: bool,
    #[serde(default)]
    script_text: Option<String>,
    #[serde(default)]
    script_alternatives: Vec<String>,
    #[serde(default)]
    financial_data: Option<FinancialData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScriptsRequest<'a> {
    script_text: &'a str,
    script_alternatives: &'a [String],
    financial_data: &'a FinancialData,
    document_type: &'a str,
    audience: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptsResponse {
    success: bool,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioResponse {
    success: bool,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoRequest<'a> {
    script: &'a str,
    avatar_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    success: bool,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl DocumentCollaborator for HttpCollaborator {
    fn name(&self) -> &str {
        "http"
    }

    async fn extract_text(&self, document: &Document) -> Result<ExtractedText, CollaboratorError> {
        self.limits.validate_document(document)?;

        let url = self.endpoints.url(&self.endpoints.extract);
        let timeout = self.limits.timeout_for(StageKind::Extract);
        let mut headers = self.headers("application/pdf")?;
        if let Ok(name) = HeaderValue::from_str(&document.file_name) {
            headers.insert("x-file-name", name);
        }

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .timeout(timeout)
            .body(document.bytes.clone())
            .send()
            .await
            .map_err(|e| request_error(&url, timeout, e))?;

        let body: ExtractResponse = self.decode(&url, response).await?;
        check_success(body.success, body.error, "Text extraction")?;

        let content = body.content.unwrap_or_default();
        let mut text = ExtractedText::from_content(content);
        if let Some(word_count) = body.word_count {
            text.word_count = word_count;
        }

        self.limits.validate_extracted(&text)?;
        Ok(text)
    }
}

#[async_trait]
impl AnalysisCollaborator for HttpCollaborator {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(
        &self,
        text: &str,
        document_type: DocumentType,
        audience: Audience,
    ) -> Result<AnalysisOutput, CollaboratorError> {
        let request = AnalyzeRequest {
            text,
            document_type: document_type.as_str(),
            audience: audience.as_str(),
        };

        let body: AnalyzeResponse = self
            .post_json(
                &self.endpoints.analyze,
                &request,
                self.limits.timeout_for(StageKind::Analyze),
            )
            .await?;
        check_success(body.success, body.error, "Analysis")?;

        let script_text = body.script_text.unwrap_or_default();
        self.limits.require_text("script", &script_text)?;

        Ok(AnalysisOutput {
            script_text,
            script_alternatives: body.script_alternatives,
            financial_data: body.financial_data.unwrap_or_default(),
        })
    }

    async fn generate_scripts(
        &self,
        analysis: &AnalysisOutput,
        document_type: DocumentType,
        audience: Audience,
    ) -> Result<ScriptOutput, CollaboratorError> {
        let Some(ref endpoint) = self.endpoints.scripts else {
            return scripts_from_analysis(analysis);
        };

        let request = ScriptsRequest {
            script_text: &analysis.script_text,
            script_alternatives: &analysis.script_alternatives,
            financial_data: &analysis.financial_data,
            document_type: document_type.as_str(),
            audience: audience.as_str(),
        };

        let body: ScriptsResponse = self
            .post_json(
                endpoint,
                &request,
                self.limits.timeout_for(StageKind::GenerateScripts),
            )
            .await?;
        check_success(body.success, body.error, "Script generation")?;

        let primary = body.script.unwrap_or_default();
        self.limits.require_text("script", &primary)?;

        Ok(ScriptOutput {
            primary,
            alternatives: body.alternatives,
        })
    }
}

#[async_trait]
impl AudioCollaborator for HttpCollaborator {
    fn name(&self) -> &str {
        "http"
    }

    async fn synthesize_audio(
        &self,
        script_text: &str,
        voice_id: &str,
        voice_settings: &VoiceSettings,
    ) -> Result<AudioOutput, CollaboratorError> {
        let request = AudioRequest {
            text: script_text,
            voice_id,
            voice_settings,
        };

        let body: AudioResponse = self
            .post_json(
                &self.endpoints.audio,
                &request,
                self.limits.timeout_for(StageKind::SynthesizeAudio),
            )
            .await?;
        check_success(body.success, body.error, "Audio synthesis")?;

        let audio_url = body.audio_url.unwrap_or_default();
        self.limits.require_text("audio URL", &audio_url)?;

        Ok(AudioOutput {
            audio_url,
            duration_secs: body.duration,
        })
    }
}

#[async_trait]
impl VideoCollaborator for HttpCollaborator {
    fn name(&self) -> &str {
        "http"
    }

    async fn synthesize_video(
        &self,
        script_text: &str,
        avatar_id: &str,
    ) -> Result<VideoOutput, CollaboratorError> {
        let request = VideoRequest {
            script: script_text,
            avatar_id,
        };

        let body: VideoResponse = self
            .post_json(
                &self.endpoints.video,
                &request,
                self.limits.timeout_for(StageKind::SynthesizeVideo),
            )
            .await?;
        check_success(body.success, body.error, "Video generation")?;

        let video_url = body.video_url.unwrap_or_default();
        self.limits.require_text("video URL", &video_url)?;

        Ok(VideoOutput {
            video_url,
            thumbnail_url: body.thumbnail_url,
            duration_secs: body.duration.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        let endpoints = EndpointConfig {
            base_url: "https://app.example.com/.netlify/functions/".to_string(),
            video: "https://video.example.com/render".to_string(),
            ..Default::default()
        };

        assert_eq!(
            endpoints.url(&endpoints.extract),
            "https://app.example.com/.netlify/functions/extract-text"
        );
        assert_eq!(endpoints.url("/analyze-document"), "https://app.example.com/.netlify/functions/analyze-document");
        assert_eq!(endpoints.url(&endpoints.video), "https://video.example.com/render");
    }

    #[test]
    fn test_envelope_decoding() {
        let body: AnalyzeResponse = serde_json::from_str(
            r#"{
                "success": true,
                "scriptText": "Good morning, investors.",
                "scriptAlternatives": ["Hello."],
                "financialData": { "period": "Q3 2024", "metrics": [{ "name": "Revenue", "value": 12.5, "unit": "MSEK" }] }
            }"#,
        )
        .unwrap();

        assert!(body.success);
        assert_eq!(body.script_alternatives.len(), 1);
        let data = body.financial_data.unwrap();
        assert_eq!(data.period.as_deref(), Some("Q3 2024"));
        assert_eq!(data.metrics[0].value, 12.5);
    }

    #[test]
    fn test_failed_envelope_uses_provider_message() {
        let err = check_success(false, Some("Quota exceeded".to_string()), "Audio synthesis")
            .unwrap_err();
        assert_eq!(err.kind, CollaboratorErrorKind::Rejected);
        assert_eq!(err.message, "Quota exceeded");

        let err = check_success(false, None, "Audio synthesis").unwrap_err();
        assert_eq!(err.message, "Audio synthesis failed without an error message");
    }

    #[test]
    fn test_envelope_error_extraction() {
        assert_eq!(
            envelope_error(r#"{"success":false,"error":"Invalid avatar"}"#),
            Some("Invalid avatar".to_string())
        );
        assert_eq!(envelope_error("<html>502</html>"), None);
    }

    #[test]
    fn test_api_key_header() {
        let collaborator = HttpCollaborator::new(EndpointConfig::default(), CollaboratorLimits::default())
            .with_api_key("secret");
        let headers = collaborator.headers("application/json").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
    }

    #[tokio::test]
    async fn test_oversized_document_rejected_before_network() {
        let limits = CollaboratorLimits {
            max_document_bytes: 10,
            ..Default::default()
        };
        // Unroutable base URL: reaching the network would surface a transport error
        let collaborator = HttpCollaborator::new(
            EndpointConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                ..Default::default()
            },
            limits,
        );

        let doc = Document::new("p", "big.pdf", vec![0u8; 11]);
        let err = collaborator.extract_text(&doc).await.unwrap_err();
        assert_eq!(err.kind, CollaboratorErrorKind::InputTooLarge);
    }
}
