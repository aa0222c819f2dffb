//! The transcription job state machine.
//!
//! `not_started → in_progress → {completed, failed}`; the terminal states
//! admit no further automatic transition. Poll and webhook both funnel into
//! `apply_provider_status`, so the two entry paths cannot diverge.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::blob::BlobStore;
use crate::error::{AppError, AppResult};
use crate::recording::{Recording, RecordingRepo, TranscriptionStatus};
use crate::transcription::provider::{JobState, SubmitOptions, TranscriptionProvider};
use crate::transcription::{Transcription, TranscriptionRepo, diarize};

const EVENT_CREATION: &str = "transcription_creation";
const EVENT_PROCESSING: &str = "transcription_processing";
const EVENT_COMPLETION: &str = "transcription_completion";
const EVENT_DELETION: &str = "transcription_deletion";

/// What the webhook endpoint should answer with.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookReply {
    Ack,
    /// Echo of the validation token from a challenge handshake.
    Challenge(String),
}

#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Stale in-progress jobs older than this are failed by the sweep.
    pub timeout_secs: i64,
    /// Lifetime of the signed audio URL handed to the provider.
    pub signed_url_ttl_secs: i64,
    /// Public callback endpoint registered with the provider, if any.
    pub webhook_url: Option<String>,
}

pub struct TranscriptionJobManager {
    recordings: RecordingRepo,
    transcriptions: TranscriptionRepo,
    provider: Arc<dyn TranscriptionProvider>,
    blob: Arc<dyn BlobStore>,
    config: JobManagerConfig,
    /// Per-recording mutexes. Never held across a provider call: the lock
    /// covers read-validate-write windows only, and state is re-checked
    /// after each unlocked network round trip.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TranscriptionJobManager {
    pub fn new(
        recordings: RecordingRepo,
        transcriptions: TranscriptionRepo,
        provider: Arc<dyn TranscriptionProvider>,
        blob: Arc<dyn BlobStore>,
        config: JobManagerConfig,
    ) -> Self {
        Self {
            recordings,
            transcriptions,
            provider,
            blob,
            config,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, recording_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(recording_id.to_string())
            .or_default()
            .clone()
    }

    /// Submit the recording's audio to the external provider.
    ///
    /// Fails with `Conflict` when a job is already in progress or completed;
    /// a new attempt requires deleting the transcription first. A provider
    /// failure leaves the recording in `not_started` so the user can retry.
    pub async fn submit(&self, user_id: &str, recording_id: &str) -> AppResult<Recording> {
        let lock = self.lock_for(recording_id);

        let (audio_url, secret) = {
            let _guard = lock.lock().await;
            let recording = self.recordings.get_owned(recording_id, user_id).await?;
            check_submittable(&recording)?;

            // 1:1 with the recording: reuse the existing document if a prior
            // attempt created one.
            let mut transcription = match self.transcriptions.get_by_recording(recording_id).await? {
                Some(existing) => existing,
                None => self.transcriptions.create(&recording.user_id, recording_id).await?,
            };
            let secret = uuid::Uuid::new_v4().to_string();
            transcription.callback_secret = Some(secret.clone());
            transcription.updated_at = Utc::now();
            self.transcriptions.update(&transcription).await?;

            let audio_url = self
                .blob
                .signed_read_url(&recording.storage_filename, self.config.signed_url_ttl_secs)
                .await
                .map_err(|e| AppError::ExternalProvider(e.to_string()))?;
            (audio_url, secret)
        };

        // Blocking provider I/O happens with the lock released.
        let options = SubmitOptions {
            webhook_url: self.config.webhook_url.clone(),
            webhook_secret: Some(secret),
            ..SubmitOptions::default()
        };
        let job_id = self.provider.submit(&audio_url, &options).await?;
        info!("submitted recording {recording_id} as external job {job_id}");

        let _guard = lock.lock().await;
        let mut recording = self.recordings.get_owned(recording_id, user_id).await?;
        if check_submittable(&recording).is_err() {
            // A concurrent submit won the race during the unlocked window;
            // its job tracking must not be clobbered. Ours is orphaned and
            // will expire provider-side.
            warn!("discarding duplicate external job {job_id} for recording {recording_id}");
            return Err(AppError::Conflict(
                "transcription already submitted for this recording".to_string(),
            ));
        }

        recording.transcription_status = TranscriptionStatus::InProgress;
        recording.transcription_status_updated_at = Utc::now();
        recording.external_job_id = Some(job_id.clone());
        recording.transcription_error_message = None;
        self.recordings.update(&recording).await?;

        if let Some(mut transcription) = self.transcriptions.get_by_recording(recording_id).await? {
            transcription.external_job_id = Some(job_id);
            transcription.updated_at = Utc::now();
            self.transcriptions.update(&transcription).await?;
        }

        Ok(recording)
    }

    /// Caller-driven status inspection: polls the provider for in-progress
    /// jobs, applies any terminal result, and runs the timeout sweep.
    pub async fn poll(&self, user_id: &str, recording_id: &str) -> AppResult<Recording> {
        let recording = self.recordings.get_owned(recording_id, user_id).await?;
        if recording.transcription_status != TranscriptionStatus::InProgress {
            return Ok(recording);
        }

        match recording.external_job_id.clone() {
            Some(job_id) => match self.provider.fetch_status(&job_id).await {
                Ok(status) => match status.state {
                    JobState::Succeeded => {
                        self.apply_provider_status(recording_id, JobState::Succeeded, status.payload, None)
                            .await?;
                    }
                    JobState::Failed => {
                        let message = status
                            .error
                            .unwrap_or_else(|| "provider reported failure".to_string());
                        self.apply_provider_status(recording_id, JobState::Failed, None, Some(message))
                            .await?;
                    }
                    JobState::Unstarted | JobState::Running => {
                        self.sweep_if_stale(recording_id).await?;
                    }
                },
                Err(e) => {
                    // A status check that cannot reach the provider marks the
                    // job failed with the captured message.
                    error!("status check for job {job_id} failed: {e}");
                    self.apply_provider_status(recording_id, JobState::Failed, None, Some(e.to_string()))
                        .await?;
                }
            },
            None => {
                // Tracking was lost; the sweep is the only way out.
                self.sweep_if_stale(recording_id).await?;
            }
        }

        self.recordings.get_owned(recording_id, user_id).await
    }

    /// The single place a provider-reported state becomes a local
    /// transition, shared by the poll and webhook adapters.
    pub async fn apply_provider_status(
        &self,
        recording_id: &str,
        state: JobState,
        payload: Option<Value>,
        error_message: Option<String>,
    ) -> AppResult<()> {
        let lock = self.lock_for(recording_id);
        let _guard = lock.lock().await;

        let Some(mut recording) = self.recordings.get(recording_id).await? else {
            return Err(AppError::NotFound("recording"));
        };

        // Terminal states are sticky: duplicate notifications are no-ops and
        // a late opposing terminal status never overwrites the first.
        if recording.transcription_status.is_terminal() {
            info!(
                "ignoring provider status for recording {recording_id}: already {:?}",
                recording.transcription_status
            );
            return Ok(());
        }

        match state {
            JobState::Succeeded => {
                let payload = payload.ok_or_else(|| {
                    AppError::InvalidProviderResponse("succeeded without a payload".to_string())
                })?;
                match diarize::parse_payload(&payload) {
                    Ok(phrases) => {
                        let Some(mut transcription) =
                            self.transcriptions.get_by_recording(recording_id).await?
                        else {
                            return Err(AppError::NotFound("transcription"));
                        };
                        transcription.raw_provider_payload = Some(payload);
                        transcription.diarized_transcript =
                            Some(diarize::diarized_transcript(&phrases));
                        transcription.text = Some(diarize::plain_text(&phrases));
                        transcription.updated_at = Utc::now();
                        self.transcriptions.update(&transcription).await?;

                        recording.transcription_status = TranscriptionStatus::Completed;
                        recording.transcription_id = Some(transcription.id.clone());
                        recording.transcription_error_message = None;
                        recording.transcription_status_updated_at = Utc::now();
                        self.recordings.update(&recording).await?;
                        info!("transcription completed for recording {recording_id}");
                    }
                    Err(e) => {
                        // A result we cannot parse is a failed job, message
                        // captured verbatim.
                        error!("unparseable result payload for recording {recording_id}: {e}");
                        recording.transcription_status = TranscriptionStatus::Failed;
                        recording.transcription_error_message = Some(e.to_string());
                        recording.transcription_status_updated_at = Utc::now();
                        self.recordings.update(&recording).await?;
                    }
                }
            }
            JobState::Failed => {
                recording.transcription_status = TranscriptionStatus::Failed;
                recording.transcription_error_message =
                    Some(error_message.unwrap_or_else(|| "transcription failed".to_string()));
                recording.transcription_status_updated_at = Utc::now();
                self.recordings.update(&recording).await?;
                warn!("transcription failed for recording {recording_id}");
            }
            JobState::Unstarted | JobState::Running => {
                // Still running: nothing to record beyond confirming the
                // in-progress status is current.
            }
        }

        Ok(())
    }

    /// Liveness safeguard against orphaned external jobs: force-fail an
    /// in-progress job whose status has not moved within the configured
    /// threshold. Runs opportunistically on status inspections; there is no
    /// background scheduler.
    pub async fn sweep_if_stale(&self, recording_id: &str) -> AppResult<bool> {
        let lock = self.lock_for(recording_id);
        let _guard = lock.lock().await;

        let Some(mut recording) = self.recordings.get(recording_id).await? else {
            return Ok(false);
        };
        if recording.transcription_status != TranscriptionStatus::InProgress {
            return Ok(false);
        }

        let age = Utc::now() - recording.transcription_status_updated_at;
        if age <= Duration::seconds(self.config.timeout_secs) {
            return Ok(false);
        }

        warn!(
            "transcription for recording {recording_id} stale after {}s, failing it",
            age.num_seconds()
        );
        recording.transcription_status = TranscriptionStatus::Failed;
        recording.transcription_error_message = Some(format!(
            "transcription timed out: no provider status for {} seconds",
            age.num_seconds()
        ));
        recording.transcription_status_updated_at = Utc::now();
        self.recordings.update(&recording).await?;
        Ok(true)
    }

    /// Provider-driven entry point. Challenge and ping events are part of
    /// the registration handshake; job events must carry the per-job
    /// callback secret or they are rejected without touching state.
    pub async fn handle_webhook(
        &self,
        event_type: &str,
        secret_header: Option<&str>,
        body: &Value,
    ) -> AppResult<WebhookReply> {
        match event_type {
            "challenge" => {
                let token = body
                    .get("validationToken")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::InvalidInput("challenge without validationToken".to_string())
                    })?;
                info!("answering webhook challenge");
                Ok(WebhookReply::Challenge(token.to_string()))
            }
            "ping" => Ok(WebhookReply::Ack),
            EVENT_CREATION | EVENT_PROCESSING | EVENT_COMPLETION | EVENT_DELETION => {
                let job_id = body
                    .get("job_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::InvalidInput("job_id is required".to_string()))?;

                let Some(mut transcription) = self.transcriptions.get_by_job(job_id).await? else {
                    return Err(AppError::NotFound("transcription"));
                };
                verify_callback_secret(&transcription, secret_header)?;

                {
                    let lock = self.lock_for(&transcription.recording_id);
                    let _guard = lock.lock().await;
                    transcription.provider_log.push(event_type.to_string());
                    transcription.updated_at = Utc::now();
                    self.transcriptions.update(&transcription).await?;
                }

                if event_type == EVENT_COMPLETION {
                    // The event only says "done"; the result still comes from
                    // the provider, then through the same finalization as a
                    // poll.
                    let status = self.provider.fetch_status(job_id).await?;
                    self.apply_provider_status(
                        &transcription.recording_id,
                        status.state,
                        status.payload,
                        status.error,
                    )
                    .await?;
                }

                Ok(WebhookReply::Ack)
            }
            other => Err(AppError::InvalidInput(format!(
                "unhandled event type: {other}"
            ))),
        }
    }

    /// Delete a transcription the user owns. The recording survives and
    /// resets to `not_started`, clearing job tracking.
    pub async fn delete_transcription(&self, user_id: &str, transcription_id: &str) -> AppResult<()> {
        let transcription = self.transcriptions.get_owned(transcription_id, user_id).await?;

        let lock = self.lock_for(&transcription.recording_id);
        let _guard = lock.lock().await;

        self.transcriptions.delete(&transcription.id).await?;
        if let Some(mut recording) = self.recordings.get(&transcription.recording_id).await? {
            recording.transcription_status = TranscriptionStatus::NotStarted;
            recording.transcription_status_updated_at = Utc::now();
            recording.external_job_id = None;
            recording.transcription_id = None;
            recording.transcription_error_message = None;
            self.recordings.update(&recording).await?;
        }
        info!("deleted transcription {transcription_id}");
        Ok(())
    }

    /// Cascade hook for recording deletion: drop the linked transcription,
    /// if any.
    pub async fn delete_for_recording(&self, recording_id: &str) -> AppResult<()> {
        if let Some(transcription) = self.transcriptions.get_by_recording(recording_id).await? {
            self.transcriptions.delete(&transcription.id).await?;
        }
        Ok(())
    }

    pub fn transcriptions(&self) -> &TranscriptionRepo {
        &self.transcriptions
    }
}

fn check_submittable(recording: &Recording) -> AppResult<()> {
    match recording.transcription_status {
        TranscriptionStatus::InProgress => Err(AppError::Conflict(
            "transcription already in progress for this recording".to_string(),
        )),
        TranscriptionStatus::Completed => Err(AppError::Conflict(
            "transcription already completed for this recording".to_string(),
        )),
        TranscriptionStatus::NotStarted | TranscriptionStatus::Failed => Ok(()),
    }
}

fn verify_callback_secret(
    transcription: &Transcription,
    secret_header: Option<&str>,
) -> AppResult<()> {
    match (&transcription.callback_secret, secret_header) {
        (Some(expected), Some(presented)) if expected == presented => Ok(()),
        _ => Err(AppError::Authentication(
            "callback secret missing or mismatched".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobError, BlobProperties};
    use crate::store::InMemoryDocumentStore;
    use crate::transcription::provider::JobStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct MockProvider {
        submitted: StdMutex<Vec<SubmitOptions>>,
        fail_submit: bool,
        status: StdMutex<AppResult<JobStatus>>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                submitted: StdMutex::new(Vec::new()),
                fail_submit: false,
                status: StdMutex::new(Ok(JobStatus {
                    state: JobState::Running,
                    payload: None,
                    error: None,
                })),
            }
        }

        fn set_status(&self, status: AppResult<JobStatus>) {
            *self.status.lock().unwrap() = status;
        }
    }

    #[async_trait]
    impl TranscriptionProvider for MockProvider {
        async fn submit(&self, _audio_url: &str, options: &SubmitOptions) -> AppResult<String> {
            if self.fail_submit {
                return Err(AppError::ExternalProvider("submit refused".to_string()));
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(options.clone());
            Ok(format!("job-{}", submitted.len()))
        }

        async fn fetch_status(&self, _job_id: &str) -> AppResult<JobStatus> {
            match &*self.status.lock().unwrap() {
                Ok(status) => Ok(status.clone()),
                Err(e) => Err(AppError::ExternalProvider(e.to_string())),
            }
        }
    }

    struct NullBlob;

    #[async_trait]
    impl BlobStore for NullBlob {
        async fn put(&self, _name: &str, _bytes: &[u8]) -> Result<(), BlobError> {
            Ok(())
        }
        async fn signed_read_url(&self, name: &str, _ttl: i64) -> Result<String, BlobError> {
            Ok(format!("http://signed.test/{name}"))
        }
        async fn properties(&self, _name: &str) -> Result<BlobProperties, BlobError> {
            Ok(BlobProperties { size: 0 })
        }
        async fn delete(&self, _name: &str) -> Result<(), BlobError> {
            Ok(())
        }
    }

    struct Fixture {
        manager: TranscriptionJobManager,
        provider: Arc<MockProvider>,
        recordings: RecordingRepo,
        transcriptions: TranscriptionRepo,
    }

    fn fixture_with(provider: MockProvider, timeout_secs: i64) -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let recordings = RecordingRepo::new(store.clone());
        let transcriptions = TranscriptionRepo::new(store);
        let provider = Arc::new(provider);
        let manager = TranscriptionJobManager::new(
            recordings.clone(),
            transcriptions.clone(),
            provider.clone(),
            Arc::new(NullBlob),
            JobManagerConfig {
                timeout_secs,
                signed_url_ttl_secs: 3600,
                webhook_url: Some("http://localhost/transcription_webhook".to_string()),
            },
        );
        Fixture {
            manager,
            provider,
            recordings,
            transcriptions,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockProvider::new(), 900)
    }

    async fn seed_recording(fx: &Fixture) -> Recording {
        fx.recordings
            .create("u1", "talk.mp3", "stored.mp3", Some(30.0))
            .await
            .unwrap()
    }

    fn succeeded_payload() -> JobStatus {
        JobStatus {
            state: JobState::Succeeded,
            payload: Some(json!({
                "status": "completed",
                "utterances": [
                    {"speaker": "1", "text": "Hi"},
                    {"speaker": "1", "text": "there"},
                    {"speaker": "2", "text": "Hello"},
                ],
            })),
            error: None,
        }
    }

    #[tokio::test]
    async fn submit_moves_recording_to_in_progress() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;

        let updated = fx.manager.submit("u1", &recording.id).await.unwrap();
        assert_eq!(updated.transcription_status, TranscriptionStatus::InProgress);
        assert_eq!(updated.external_job_id.as_deref(), Some("job-1"));

        let transcription = fx
            .transcriptions
            .get_by_recording(&recording.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transcription.external_job_id.as_deref(), Some("job-1"));
        assert!(transcription.callback_secret.is_some());

        // Diarization requested, with the webhook secret wired through.
        let submitted = fx.provider.submitted.lock().unwrap();
        assert!(submitted[0].diarization);
        assert_eq!(
            submitted[0].webhook_secret,
            transcription.callback_secret
        );
    }

    #[tokio::test]
    async fn double_submission_is_a_conflict() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;

        fx.manager.submit("u1", &recording.id).await.unwrap();
        let second = fx.manager.submit("u1", &recording.id).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        // The first job's tracking survived the rejected duplicate.
        let loaded = fx.recordings.get(&recording.id).await.unwrap().unwrap();
        assert_eq!(loaded.external_job_id.as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn submit_failure_leaves_recording_not_started() {
        let mut provider = MockProvider::new();
        provider.fail_submit = true;
        let fx = fixture_with(provider, 900);
        let recording = seed_recording(&fx).await;

        let result = fx.manager.submit("u1", &recording.id).await;
        assert!(matches!(result, Err(AppError::ExternalProvider(_))));

        let loaded = fx.recordings.get(&recording.id).await.unwrap().unwrap();
        assert_eq!(loaded.transcription_status, TranscriptionStatus::NotStarted);
        assert!(loaded.external_job_id.is_none());
    }

    #[tokio::test]
    async fn successful_poll_finalizes_the_transcription() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();
        fx.provider.set_status(Ok(succeeded_payload()));

        let polled = fx.manager.poll("u1", &recording.id).await.unwrap();
        assert_eq!(polled.transcription_status, TranscriptionStatus::Completed);

        let transcription = fx
            .transcriptions
            .get_by_recording(&recording.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            transcription.diarized_transcript.as_deref(),
            Some("Speaker 1: Hi there\nSpeaker 2: Hello")
        );
        assert_eq!(transcription.text.as_deref(), Some("Hi there Hello"));
        assert_eq!(polled.transcription_id, Some(transcription.id));
    }

    #[tokio::test]
    async fn terminal_states_are_sticky() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();
        fx.provider.set_status(Ok(succeeded_payload()));
        fx.manager.poll("u1", &recording.id).await.unwrap();

        // Duplicate terminal notification: a safe no-op.
        fx.manager
            .apply_provider_status(
                &recording.id,
                JobState::Succeeded,
                succeeded_payload().payload,
                None,
            )
            .await
            .unwrap();
        // A late opposing terminal status must not overwrite completed.
        fx.manager
            .apply_provider_status(&recording.id, JobState::Failed, None, Some("late".to_string()))
            .await
            .unwrap();

        let loaded = fx.recordings.get(&recording.id).await.unwrap().unwrap();
        assert_eq!(loaded.transcription_status, TranscriptionStatus::Completed);
        assert!(loaded.transcription_error_message.is_none());
    }

    #[tokio::test]
    async fn stale_in_progress_job_times_out_on_poll() {
        let fx = fixture_with(MockProvider::new(), 60);
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();

        // Backdate the last status change beyond the threshold.
        let mut loaded = fx.recordings.get(&recording.id).await.unwrap().unwrap();
        loaded.transcription_status_updated_at = Utc::now() - Duration::seconds(120);
        fx.recordings.update(&loaded).await.unwrap();

        // Provider still says running, so the sweep decides.
        let polled = fx.manager.poll("u1", &recording.id).await.unwrap();
        assert_eq!(polled.transcription_status, TranscriptionStatus::Failed);
        assert!(
            polled
                .transcription_error_message
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn fresh_in_progress_job_is_left_alone() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();

        let polled = fx.manager.poll("u1", &recording.id).await.unwrap();
        assert_eq!(polled.transcription_status, TranscriptionStatus::InProgress);
    }

    #[tokio::test]
    async fn provider_error_during_poll_fails_the_job() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();
        fx.provider
            .set_status(Err(AppError::ExternalProvider("boom".to_string())));

        let polled = fx.manager.poll("u1", &recording.id).await.unwrap();
        assert_eq!(polled.transcription_status, TranscriptionStatus::Failed);
        assert!(polled.transcription_error_message.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn webhook_completion_converges_with_poll() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();
        fx.provider.set_status(Ok(succeeded_payload()));

        let secret = fx
            .transcriptions
            .get_by_recording(&recording.id)
            .await
            .unwrap()
            .unwrap()
            .callback_secret
            .unwrap();

        let reply = fx
            .manager
            .handle_webhook(
                "transcription_completion",
                Some(&secret),
                &json!({"job_id": "job-1"}),
            )
            .await
            .unwrap();
        assert_eq!(reply, WebhookReply::Ack);

        let loaded = fx.recordings.get(&recording.id).await.unwrap().unwrap();
        assert_eq!(loaded.transcription_status, TranscriptionStatus::Completed);

        let transcription = fx
            .transcriptions
            .get_by_recording(&recording.id)
            .await
            .unwrap()
            .unwrap();
        assert!(
            transcription
                .provider_log
                .contains(&"transcription_completion".to_string())
        );
    }

    #[tokio::test]
    async fn webhook_with_bad_secret_changes_nothing() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();
        fx.provider.set_status(Ok(succeeded_payload()));

        let result = fx
            .manager
            .handle_webhook(
                "transcription_completion",
                Some("wrong-secret"),
                &json!({"job_id": "job-1"}),
            )
            .await;
        assert!(matches!(result, Err(AppError::Authentication(_))));

        let loaded = fx.recordings.get(&recording.id).await.unwrap().unwrap();
        assert_eq!(loaded.transcription_status, TranscriptionStatus::InProgress);
    }

    #[tokio::test]
    async fn webhook_handshake_events() {
        let fx = fixture();

        let challenge = fx
            .manager
            .handle_webhook("challenge", None, &json!({"validationToken": "tok-1"}))
            .await
            .unwrap();
        assert_eq!(challenge, WebhookReply::Challenge("tok-1".to_string()));

        let ping = fx.manager.handle_webhook("ping", None, &json!({})).await.unwrap();
        assert_eq!(ping, WebhookReply::Ack);

        let unknown = fx.manager.handle_webhook("reboot", None, &json!({})).await;
        assert!(matches!(unknown, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn deleting_the_transcription_resets_the_recording() {
        let fx = fixture();
        let recording = seed_recording(&fx).await;
        fx.manager.submit("u1", &recording.id).await.unwrap();
        fx.provider.set_status(Ok(succeeded_payload()));
        fx.manager.poll("u1", &recording.id).await.unwrap();

        let transcription_id = fx
            .recordings
            .get(&recording.id)
            .await
            .unwrap()
            .unwrap()
            .transcription_id
            .unwrap();
        fx.manager
            .delete_transcription("u1", &transcription_id)
            .await
            .unwrap();

        let loaded = fx.recordings.get(&recording.id).await.unwrap().unwrap();
        assert_eq!(loaded.transcription_status, TranscriptionStatus::NotStarted);
        assert!(loaded.external_job_id.is_none());
        assert!(loaded.transcription_id.is_none());
        assert!(
            fx.transcriptions
                .get(&transcription_id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
