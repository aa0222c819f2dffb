//! Transcription entity and the asynchronous external-job machinery.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{DocumentStore, PARTITION_TRANSCRIPTION, StoreError};

pub mod diarize;
pub mod job;
pub mod provider;

pub use job::TranscriptionJobManager;

/// One inferred speaker: display name plus the model's reasoning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeakerMapping {
    pub name: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transcription {
    pub id: String,
    /// 1:1 with a recording, enforced by lookup-by-recording before create.
    pub recording_id: String,
    pub user_id: String,
    pub external_job_id: Option<String>,
    /// Per-job secret the provider echoes back on webhook callbacks.
    pub callback_secret: Option<String>,
    pub raw_provider_payload: Option<serde_json::Value>,
    /// "Speaker <label>: <utterance>" paragraphs, one per speaker turn.
    pub diarized_transcript: Option<String>,
    pub text: Option<String>,
    pub speaker_mapping: Option<HashMap<String, SpeakerMapping>>,
    /// Webhook event trail (creation, processing, completion, deletion).
    pub provider_log: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Document-store-backed repository for transcriptions.
#[derive(Clone)]
pub struct TranscriptionRepo {
    store: Arc<dyn DocumentStore>,
}

impl TranscriptionRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, user_id: &str, recording_id: &str) -> AppResult<Transcription> {
        let now = Utc::now();
        let transcription = Transcription {
            id: Uuid::new_v4().to_string(),
            recording_id: recording_id.to_string(),
            user_id: user_id.to_string(),
            external_job_id: None,
            callback_secret: None,
            raw_provider_payload: None,
            diarized_transcript: None,
            text: None,
            speaker_mapping: None,
            provider_log: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store
            .create(
                PARTITION_TRANSCRIPTION,
                &transcription.id,
                serde_json::to_value(&transcription).map_err(StoreError::from)?,
            )
            .await?;
        Ok(transcription)
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<Transcription>> {
        let Some(doc) = self.store.read(PARTITION_TRANSCRIPTION, id).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc).map_err(StoreError::from)?))
    }

    pub async fn get_by_recording(&self, recording_id: &str) -> AppResult<Option<Transcription>> {
        let docs = self
            .store
            .query_eq(PARTITION_TRANSCRIPTION, "recording_id", recording_id)
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(serde_json::from_value(doc).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_job(&self, external_job_id: &str) -> AppResult<Option<Transcription>> {
        let docs = self
            .store
            .query_eq(PARTITION_TRANSCRIPTION, "external_job_id", external_job_id)
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(serde_json::from_value(doc).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    pub async fn update(&self, transcription: &Transcription) -> AppResult<()> {
        self.store
            .replace(
                PARTITION_TRANSCRIPTION,
                &transcription.id,
                serde_json::to_value(transcription).map_err(StoreError::from)?,
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.store.delete(PARTITION_TRANSCRIPTION, id).await?;
        Ok(())
    }

    /// The transcription a user owns, or NotFound (absence and foreign
    /// ownership look the same from outside).
    pub async fn get_owned(&self, id: &str, user_id: &str) -> AppResult<Transcription> {
        match self.get(id).await? {
            Some(transcription) if transcription.user_id == user_id => Ok(transcription),
            _ => Err(AppError::NotFound("transcription")),
        }
    }
}
