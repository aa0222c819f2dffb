//! Abstract contract of the external speech-to-text provider, plus the
//! reqwest-based implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Provider-side job states, mapped onto our status taxonomy by the job
/// manager (unstarted→not_started, running→in_progress, succeeded→completed,
/// failed→failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Unstarted,
    Running,
    Succeeded,
    Failed,
}

/// A snapshot of an external job as the provider reports it.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    /// Full result payload; present once the job has succeeded.
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub diarization: bool,
    pub min_speakers: u32,
    pub max_speakers: u32,
    /// Callback endpoint the provider posts job events to, with the per-job
    /// secret it must echo in the `x-callback-secret` header.
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            diarization: true,
            min_speakers: 1,
            max_speakers: 5,
            webhook_url: None,
            webhook_secret: None,
        }
    }
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Submit an audio URL for asynchronous transcription; returns the
    /// provider's opaque job id.
    async fn submit(&self, audio_url: &str, options: &SubmitOptions) -> AppResult<String>;

    /// Fetch the current status (and, when finished, the result payload) of
    /// a previously submitted job.
    async fn fetch_status(&self, job_id: &str) -> AppResult<JobStatus>;
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    speaker_labels: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    speakers_expected_min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speakers_expected_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_auth_header_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_auth_header_value: Option<&'a str>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

/// HTTP speech-to-text provider client.
pub struct HttpTranscriptionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTranscriptionProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl TranscriptionProvider for HttpTranscriptionProvider {
    async fn submit(&self, audio_url: &str, options: &SubmitOptions) -> AppResult<String> {
        let request = SubmitRequest {
            audio_url,
            speaker_labels: options.diarization,
            speakers_expected_min: options.diarization.then_some(options.min_speakers),
            speakers_expected_max: options.diarization.then_some(options.max_speakers),
            webhook_url: options.webhook_url.as_deref(),
            webhook_auth_header_name: options.webhook_secret.is_some().then_some("x-callback-secret"),
            webhook_auth_header_value: options.webhook_secret.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/transcripts", self.base_url))
            .header("authorization", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalProvider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalProvider(format!(
                "submit returned {status}: {body}"
            )));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| AppError::InvalidProviderResponse(e.to_string()))?;
        Ok(submitted.id)
    }

    async fn fetch_status(&self, job_id: &str) -> AppResult<JobStatus> {
        let response = self
            .client
            .get(format!("{}/transcripts/{}", self.base_url, job_id))
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalProvider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalProvider(format!(
                "status check returned {status}: {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::InvalidProviderResponse(e.to_string()))?;

        let raw_state = payload
            .get("status")
            .and_then(|s| s.as_str())
            .ok_or_else(|| {
                AppError::InvalidProviderResponse("status field missing".to_string())
            })?;
        let state = parse_job_state(raw_state)?;
        let error = payload
            .get("error")
            .and_then(|e| e.as_str())
            .map(|e| e.to_string());

        Ok(JobStatus {
            state,
            payload: (state == JobState::Succeeded).then_some(payload),
            error,
        })
    }
}

/// Provider status strings vary by vendor; accept both the queued/processing
/// and the NotStarted/Running families.
pub fn parse_job_state(raw: &str) -> AppResult<JobState> {
    match raw.to_ascii_lowercase().as_str() {
        "queued" | "notstarted" | "not_started" => Ok(JobState::Unstarted),
        "processing" | "running" => Ok(JobState::Running),
        "completed" | "succeeded" => Ok(JobState::Succeeded),
        "error" | "failed" => Ok(JobState::Failed),
        other => Err(AppError::InvalidProviderResponse(format!(
            "unknown job status {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_map_to_states() {
        assert_eq!(parse_job_state("queued").unwrap(), JobState::Unstarted);
        assert_eq!(parse_job_state("NotStarted").unwrap(), JobState::Unstarted);
        assert_eq!(parse_job_state("Running").unwrap(), JobState::Running);
        assert_eq!(parse_job_state("processing").unwrap(), JobState::Running);
        assert_eq!(parse_job_state("Succeeded").unwrap(), JobState::Succeeded);
        assert_eq!(parse_job_state("completed").unwrap(), JobState::Succeeded);
        assert_eq!(parse_job_state("error").unwrap(), JobState::Failed);
        assert!(parse_job_state("exploded").is_err());
    }
}
