//! Recording entity, repository, and lifecycle (ingest, probe, delete).

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audiostream::probe_duration_secs;
use crate::blob::{BlobError, BlobStore};
use crate::error::{AppError, AppResult};
use crate::store::{DocumentStore, PARTITION_RECORDING, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    NotStarted,
    InProgress,
    Failed,
    Completed,
}

impl TranscriptionStatus {
    /// Terminal states admit no further automatic transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, TranscriptionStatus::Completed | TranscriptionStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recording {
    pub id: String,
    pub user_id: String,
    pub original_filename: String,
    /// Unique name in the byte store.
    pub storage_filename: String,
    pub upload_timestamp: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub transcription_status: TranscriptionStatus,
    pub transcription_status_updated_at: DateTime<Utc>,
    pub external_job_id: Option<String>,
    pub transcription_id: Option<String>,
    pub transcription_error_message: Option<String>,
}

impl Recording {
    /// `in_progress` without a job id means we lost track of an external
    /// job. Log it; do not silently accept.
    fn check_invariants(&self) {
        if self.transcription_status == TranscriptionStatus::InProgress
            && self.external_job_id.is_none()
        {
            warn!(
                "recording {} is in_progress without an external job id",
                self.id
            );
        }
    }
}

/// Document-store-backed repository for recordings.
#[derive(Clone)]
pub struct RecordingRepo {
    store: Arc<dyn DocumentStore>,
}

impl RecordingRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        user_id: &str,
        original_filename: &str,
        storage_filename: &str,
        duration_secs: Option<f64>,
    ) -> AppResult<Recording> {
        let now = Utc::now();
        let recording = Recording {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            original_filename: original_filename.to_string(),
            storage_filename: storage_filename.to_string(),
            upload_timestamp: now,
            duration_secs,
            transcription_status: TranscriptionStatus::NotStarted,
            transcription_status_updated_at: now,
            external_job_id: None,
            transcription_id: None,
            transcription_error_message: None,
        };
        self.store
            .create(
                PARTITION_RECORDING,
                &recording.id,
                serde_json::to_value(&recording).map_err(StoreError::from)?,
            )
            .await?;
        Ok(recording)
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<Recording>> {
        let Some(doc) = self.store.read(PARTITION_RECORDING, id).await? else {
            return Ok(None);
        };
        let recording: Recording = serde_json::from_value(doc).map_err(StoreError::from)?;
        recording.check_invariants();
        Ok(Some(recording))
    }

    /// Fetch a recording the given user owns. Absent and not-owned are both
    /// reported as not found; ownership is not leaked.
    pub async fn get_owned(&self, id: &str, user_id: &str) -> AppResult<Recording> {
        match self.get(id).await? {
            Some(recording) if recording.user_id == user_id => Ok(recording),
            _ => Err(AppError::NotFound("recording")),
        }
    }

    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Recording>> {
        let docs = self
            .store
            .query_eq(PARTITION_RECORDING, "user_id", user_id)
            .await?;
        let mut recordings = docs
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Recording>, _>>()
            .map_err(StoreError::from)?;
        recordings.sort_by(|a, b| b.upload_timestamp.cmp(&a.upload_timestamp));
        Ok(recordings)
    }

    /// Full-replace update. Callers re-fetch before mutating; the last
    /// writer wins.
    pub async fn update(&self, recording: &Recording) -> AppResult<()> {
        recording.check_invariants();
        self.store
            .replace(
                PARTITION_RECORDING,
                &recording.id,
                serde_json::to_value(recording).map_err(StoreError::from)?,
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.store.delete(PARTITION_RECORDING, id).await?;
        Ok(())
    }
}

/// Recording ingest and removal, tying the byte store to the document store.
#[derive(Clone)]
pub struct RecordingLifecycle {
    repo: RecordingRepo,
    blob: Arc<dyn BlobStore>,
}

impl RecordingLifecycle {
    pub fn new(repo: RecordingRepo, blob: Arc<dyn BlobStore>) -> Self {
        Self { repo, blob }
    }

    pub fn repo(&self) -> &RecordingRepo {
        &self.repo
    }

    /// Persist a reassembled audio stream: probe its duration, upload it
    /// under a fresh storage name, and create the Recording document.
    ///
    /// Creating a recording does not submit a transcription job; that is a
    /// separate, explicit action.
    pub async fn ingest_combined(
        &self,
        user_id: &str,
        original_filename: &str,
        audio: &[u8],
    ) -> AppResult<Recording> {
        let mut scratch = tempfile::Builder::new()
            .prefix("qs-ingest-")
            .suffix(".mp3")
            .tempfile()?;
        scratch.write_all(audio)?;
        scratch.flush()?;
        let duration = probe_duration_secs(scratch.path()).await?;

        let storage_filename = format!("{}.mp3", Uuid::new_v4());
        self.blob
            .put(&storage_filename, audio)
            .await
            .map_err(|e| AppError::ExternalProvider(e.to_string()))?;

        let recording = self
            .repo
            .create(user_id, original_filename, &storage_filename, Some(duration))
            .await?;
        info!(
            "ingested recording {} ({:.1}s) as {}",
            recording.id, duration, storage_filename
        );
        Ok(recording)
    }

    /// Delete a recording the user owns, removing its audio from the byte
    /// store. The caller cascades to any linked transcription.
    pub async fn delete(&self, recording: &Recording) -> AppResult<()> {
        match self.blob.delete(&recording.storage_filename).await {
            Ok(()) | Err(BlobError::NotFound(_)) => {}
            Err(e) => return Err(AppError::ExternalProvider(e.to_string())),
        }
        self.repo.delete(&recording.id).await?;
        info!("deleted recording {}", recording.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;

    fn repo() -> RecordingRepo {
        RecordingRepo::new(Arc::new(InMemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn create_defaults_to_not_started() {
        let repo = repo();
        let recording = repo.create("u1", "talk.mp3", "abc.mp3", Some(12.0)).await.unwrap();
        assert_eq!(recording.transcription_status, TranscriptionStatus::NotStarted);
        assert!(recording.external_job_id.is_none());

        let loaded = repo.get(&recording.id).await.unwrap().unwrap();
        assert_eq!(loaded.original_filename, "talk.mp3");
        assert_eq!(loaded.duration_secs, Some(12.0));
    }

    #[tokio::test]
    async fn ownership_is_checked_on_get_owned() {
        let repo = repo();
        let recording = repo.create("u1", "talk.mp3", "abc.mp3", None).await.unwrap();

        assert!(repo.get_owned(&recording.id, "u1").await.is_ok());
        assert!(matches!(
            repo.get_owned(&recording.id, "u2").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_scoped_to_user() {
        let repo = repo();
        repo.create("u1", "a.mp3", "a.mp3", None).await.unwrap();
        repo.create("u2", "b.mp3", "b.mp3", None).await.unwrap();

        let mine = repo.list_for_user("u1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].original_filename, "a.mp3");
    }
}
