use std::sync::Arc;

use anyhow::Context as _;

use crate::audiostream::ChunkStore;
use crate::blob::{BlobStore, FsBlobStore};
use crate::config::Config;
use crate::recording::{RecordingLifecycle, RecordingRepo};
use crate::speakers::{HttpTextGenerator, SpeakerInference};
use crate::store::SqliteDocumentStore;
use crate::transcription::job::JobManagerConfig;
use crate::transcription::provider::HttpTranscriptionProvider;
use crate::transcription::{TranscriptionJobManager, TranscriptionRepo};

/// Everything the HTTP layer needs, wired up once at process start.
/// Collaborators are constructed here and injected; nothing lives at module
/// scope.
pub struct AppContext {
    pub config: Config,
    pub chunks: ChunkStore,
    pub media: Arc<FsBlobStore>,
    pub recordings: RecordingRepo,
    pub lifecycle: RecordingLifecycle,
    pub jobs: TranscriptionJobManager,
    pub speakers: SpeakerInference,
}

impl AppContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteDocumentStore::connect(&config.database_url)
                .await
                .context("Failed to open the document store")?,
        );

        let media = Arc::new(
            FsBlobStore::new(
                config.media_dir.clone(),
                config.public_base_url.clone(),
                config.media_url_secret.clone(),
            )
            .context("Failed to open the media store")?,
        );
        let blob: Arc<dyn BlobStore> = media.clone();

        let recordings = RecordingRepo::new(store.clone());
        let transcriptions = TranscriptionRepo::new(store);
        let lifecycle = RecordingLifecycle::new(recordings.clone(), blob.clone());

        let provider = Arc::new(HttpTranscriptionProvider::new(
            config.transcription_api_url.clone(),
            config.transcription_api_key.clone(),
        ));
        let jobs = TranscriptionJobManager::new(
            recordings.clone(),
            transcriptions.clone(),
            provider,
            blob,
            JobManagerConfig {
                timeout_secs: config.transcription_timeout_secs,
                signed_url_ttl_secs: config.signed_url_ttl_secs,
                webhook_url: Some(format!("{}/transcription_webhook", config.public_base_url)),
            },
        );

        let generator = Arc::new(HttpTextGenerator::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
        ));
        let speakers = SpeakerInference::new(generator, transcriptions);

        Ok(Self {
            config,
            chunks: ChunkStore::new(),
            media,
            recordings,
            lifecycle,
            jobs,
            speakers,
        })
    }
}
