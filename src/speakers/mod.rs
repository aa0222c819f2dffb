//! Speaker-name inference: map anonymous diarization labels ("Speaker A")
//! to human names via a text-generation call.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::transcription::{SpeakerMapping, Transcription, TranscriptionRepo};

const PROMPT_TEMPLATE: &str = "\
The following is a meeting transcript where speakers are labeled anonymously \
(for example \"Speaker A\" or \"Speaker 1\"). Infer each speaker's real name \
from context such as greetings, introductions, and direct address. Respond \
with a single JSON object whose keys are the exact speaker labels and whose \
values are objects with a \"name\" and a \"reasoning\" field. If a name \
cannot be determined, use a descriptive placeholder such as \"Interviewer\".

Transcript:
__TRANSCRIPT__";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One-shot completion; returns the model's free-text response.
    async fn complete(&self, prompt: &str) -> AppResult<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Chat-completions text generator.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTextGenerator {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.1,
            max_tokens: 800,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalProvider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalProvider(format!(
                "completion returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::InvalidProviderResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::InvalidProviderResponse("no choices in response".to_string()))
    }
}

/// The inference result: the label mapping plus the transcript with labels
/// replaced by names.
#[derive(Debug, Clone)]
pub struct InferredSpeakers {
    pub mapping: HashMap<String, SpeakerMapping>,
    pub rewritten_transcript: String,
}

pub struct SpeakerInference {
    generator: Arc<dyn TextGenerator>,
    transcriptions: TranscriptionRepo,
}

impl SpeakerInference {
    pub fn new(generator: Arc<dyn TextGenerator>, transcriptions: TranscriptionRepo) -> Self {
        Self {
            generator,
            transcriptions,
        }
    }

    /// Infer names for every label in a diarized transcript.
    ///
    /// Fails with `IncompleteMapping` if the model's mapping misses any
    /// label that appears in the transcript; speakers are never guessed or
    /// silently dropped.
    pub async fn infer(&self, transcript: &str) -> AppResult<InferredSpeakers> {
        let labels = extract_labels(transcript);
        if labels.is_empty() {
            return Err(AppError::InvalidInput(
                "transcript has no speaker labels".to_string(),
            ));
        }

        let prompt = PROMPT_TEMPLATE.replace("__TRANSCRIPT__", transcript);
        let response = self.generator.complete(&prompt).await?;

        let object = extract_json_object(&response).ok_or_else(|| {
            AppError::InvalidProviderResponse("no JSON object in response".to_string())
        })?;
        let mapping: HashMap<String, SpeakerMapping> = serde_json::from_str(object)
            .map_err(|e| AppError::InvalidProviderResponse(e.to_string()))?;

        let missing: Vec<&String> = labels.iter().filter(|l| !mapping.contains_key(*l)).collect();
        if !missing.is_empty() {
            let missing = missing
                .iter()
                .map(|l| l.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AppError::IncompleteMapping(missing));
        }

        // Longest labels first so "Speaker 1" never clips "Speaker 10".
        let mut ordered: Vec<&String> = labels.iter().collect();
        ordered.sort_by_key(|l| std::cmp::Reverse(l.len()));
        let mut rewritten = transcript.to_string();
        for label in ordered {
            rewritten = rewritten.replace(label.as_str(), &mapping[label].name);
        }

        info!("inferred names for {} speakers", labels.len());
        Ok(InferredSpeakers {
            mapping,
            rewritten_transcript: rewritten,
        })
    }

    /// Run inference for a recording's transcription and persist the
    /// mapping. Re-invocation overwrites the previous mapping; failures
    /// leave the transcription untouched.
    pub async fn infer_for_recording(
        &self,
        user_id: &str,
        recording_id: &str,
    ) -> AppResult<(Transcription, InferredSpeakers)> {
        let mut transcription = match self.transcriptions.get_by_recording(recording_id).await? {
            Some(t) if t.user_id == user_id => t,
            _ => return Err(AppError::NotFound("transcription")),
        };
        let transcript = transcription
            .diarized_transcript
            .clone()
            .ok_or(AppError::NotFound("diarized transcript"))?;

        let inferred = self.infer(&transcript).await?;

        transcription.speaker_mapping = Some(inferred.mapping.clone());
        transcription.updated_at = Utc::now();
        self.transcriptions.update(&transcription).await?;
        Ok((transcription, inferred))
    }
}

/// Distinct labels appearing as "Speaker <label>:" line prefixes.
pub fn extract_labels(transcript: &str) -> BTreeSet<String> {
    transcript
        .lines()
        .filter(|line| line.starts_with("Speaker "))
        .filter_map(|line| line.split(':').next())
        .map(|label| label.trim().to_string())
        .collect()
}

/// The first balanced `{...}` object in a free-form response, skipping any
/// prose around it. Braces inside JSON strings do not count toward balance.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in response[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        response: Mutex<String>,
    }

    impl ScriptedGenerator {
        fn new(response: &str) -> Self {
            Self {
                response: Mutex::new(response.to_string()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, _prompt: &str) -> AppResult<String> {
            Ok(self.response.lock().unwrap().clone())
        }
    }

    fn inference(response: &str) -> SpeakerInference {
        SpeakerInference::new(
            Arc::new(ScriptedGenerator::new(response)),
            TranscriptionRepo::new(Arc::new(InMemoryDocumentStore::new())),
        )
    }

    const TRANSCRIPT: &str = "Speaker A: Thanks for joining, Ben.\nSpeaker B: Glad to be here, Alice.";

    #[test]
    fn labels_come_from_line_prefixes() {
        let labels = extract_labels(TRANSCRIPT);
        assert_eq!(
            labels.into_iter().collect::<Vec<_>>(),
            vec!["Speaker A".to_string(), "Speaker B".to_string()]
        );
    }

    #[test]
    fn json_object_is_found_inside_prose() {
        let response = "Sure! Here is the mapping:\n{\"a\": {\"b\": \"}\"}}\nHope that helps.";
        assert_eq!(extract_json_object(response), Some("{\"a\": {\"b\": \"}\"}}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{unbalanced"), None);
    }

    #[tokio::test]
    async fn complete_mapping_rewrites_the_transcript() {
        let response = r#"{
            "Speaker A": {"name": "Alice", "reasoning": "Ben addresses her as Alice."},
            "Speaker B": {"name": "Ben", "reasoning": "Alice thanks Ben by name."}
        }"#;
        let inferred = inference(response).infer(TRANSCRIPT).await.unwrap();

        assert_eq!(inferred.mapping["Speaker A"].name, "Alice");
        assert_eq!(
            inferred.rewritten_transcript,
            "Alice: Thanks for joining, Ben.\nBen: Glad to be here, Alice."
        );
    }

    #[tokio::test]
    async fn missing_label_fails_without_guessing() {
        let response = r#"{"Speaker A": {"name": "Alice", "reasoning": "greeting"}}"#;
        let result = inference(response).infer(TRANSCRIPT).await;

        match result {
            Err(AppError::IncompleteMapping(missing)) => assert_eq!(missing, "Speaker B"),
            other => panic!("expected IncompleteMapping, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_provider_error() {
        let result = inference("{\"Speaker A\": oops}").infer(TRANSCRIPT).await;
        assert!(matches!(result, Err(AppError::InvalidProviderResponse(_))));

        let result = inference("no braces at all").infer(TRANSCRIPT).await;
        assert!(matches!(result, Err(AppError::InvalidProviderResponse(_))));
    }

    #[tokio::test]
    async fn numbered_labels_replace_longest_first() {
        let transcript = "Speaker 1: one\nSpeaker 10: ten";
        let response = r#"{
            "Speaker 1": {"name": "Ann", "reasoning": "r"},
            "Speaker 10": {"name": "Bob", "reasoning": "r"}
        }"#;
        let inferred = inference(response).infer(transcript).await.unwrap();
        assert_eq!(inferred.rewritten_transcript, "Ann: one\nBob: ten");
    }

    #[tokio::test]
    async fn failed_inference_leaves_the_stored_transcription_unmodified() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = TranscriptionRepo::new(store);
        let mut transcription = repo.create("u1", "r1").await.unwrap();
        transcription.diarized_transcript = Some(TRANSCRIPT.to_string());
        repo.update(&transcription).await.unwrap();

        let inference = SpeakerInference::new(
            Arc::new(ScriptedGenerator::new(
                r#"{"Speaker A": {"name": "Alice", "reasoning": "r"}}"#,
            )),
            repo.clone(),
        );
        let result = inference.infer_for_recording("u1", "r1").await;
        assert!(matches!(result, Err(AppError::IncompleteMapping(_))));

        let stored = repo.get(&transcription.id).await.unwrap().unwrap();
        assert!(stored.speaker_mapping.is_none());
        assert_eq!(stored.diarized_transcript.as_deref(), Some(TRANSCRIPT));
    }

    #[tokio::test]
    async fn successful_inference_is_persisted_and_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = TranscriptionRepo::new(store);
        let mut transcription = repo.create("u1", "r1").await.unwrap();
        transcription.diarized_transcript = Some(TRANSCRIPT.to_string());
        repo.update(&transcription).await.unwrap();

        let generator = Arc::new(ScriptedGenerator::new(
            r#"{"Speaker A": {"name": "Alice", "reasoning": "r"},
                "Speaker B": {"name": "Ben", "reasoning": "r"}}"#,
        ));
        let inference = SpeakerInference::new(generator.clone(), repo.clone());

        inference.infer_for_recording("u1", "r1").await.unwrap();
        let stored = repo.get(&transcription.id).await.unwrap().unwrap();
        assert_eq!(stored.speaker_mapping.as_ref().unwrap()["Speaker B"].name, "Ben");

        // Re-inference overwrites rather than erroring.
        *generator.response.lock().unwrap() = r#"{
            "Speaker A": {"name": "Alicia", "reasoning": "r"},
            "Speaker B": {"name": "Ben", "reasoning": "r"}
        }"#
        .to_string();
        inference.infer_for_recording("u1", "r1").await.unwrap();
        let stored = repo.get(&transcription.id).await.unwrap().unwrap();
        assert_eq!(stored.speaker_mapping.as_ref().unwrap()["Speaker A"].name, "Alicia");
    }
}
