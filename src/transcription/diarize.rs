//! Normalization of provider result payloads into a diarized transcript.
//!
//! Providers report either an `utterances` array (speaker + text) or a
//! `recognizedPhrases` array (speaker + nBest candidates); both reduce to a
//! flat phrase list here.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// One speaker-attributed phrase in provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub speaker: String,
    pub text: String,
}

#[derive(Deserialize)]
struct Utterance {
    speaker: Value,
    text: String,
}

#[derive(Deserialize)]
struct RecognizedPhrase {
    speaker: Value,
    #[serde(rename = "nBest")]
    n_best: Vec<NBest>,
}

#[derive(Deserialize)]
struct NBest {
    display: String,
}

/// Extract the phrase list from a provider result payload.
pub fn parse_payload(payload: &Value) -> AppResult<Vec<Phrase>> {
    if let Some(utterances) = payload.get("utterances") {
        let utterances: Vec<Utterance> = serde_json::from_value(utterances.clone())
            .map_err(|e| AppError::InvalidProviderResponse(format!("utterances: {e}")))?;
        return Ok(utterances
            .into_iter()
            .map(|u| Phrase {
                speaker: speaker_label(&u.speaker),
                text: u.text,
            })
            .collect());
    }

    if let Some(phrases) = payload.get("recognizedPhrases") {
        let phrases: Vec<RecognizedPhrase> = serde_json::from_value(phrases.clone())
            .map_err(|e| AppError::InvalidProviderResponse(format!("recognizedPhrases: {e}")))?;
        return phrases
            .into_iter()
            .map(|p| {
                let best = p.n_best.into_iter().next().ok_or_else(|| {
                    AppError::InvalidProviderResponse("empty nBest candidate list".to_string())
                })?;
                Ok(Phrase {
                    speaker: speaker_label(&p.speaker),
                    text: best.display,
                })
            })
            .collect();
    }

    Err(AppError::InvalidProviderResponse(
        "payload has neither utterances nor recognizedPhrases".to_string(),
    ))
}

// Speakers arrive as numbers from some providers and letters from others.
fn speaker_label(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the normalized diarized transcript: consecutive phrases from the
/// same speaker merge into one "Speaker <id>:" paragraph.
pub fn diarized_transcript(phrases: &[Phrase]) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut last_speaker: Option<&str> = None;
    let mut current: Vec<&str> = Vec::new();

    for phrase in phrases {
        if last_speaker == Some(phrase.speaker.as_str()) {
            current.push(&phrase.text);
        } else {
            if let Some(speaker) = last_speaker {
                paragraphs.push(format!("Speaker {}: {}", speaker, current.join(" ")));
            }
            last_speaker = Some(&phrase.speaker);
            current = vec![&phrase.text];
        }
    }
    if let Some(speaker) = last_speaker {
        paragraphs.push(format!("Speaker {}: {}", speaker, current.join(" ")));
    }

    paragraphs.join("\n")
}

/// Plain text: every phrase joined, no speaker attribution.
pub fn plain_text(phrases: &[Phrase]) -> String {
    phrases
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn consecutive_same_speaker_phrases_merge() {
        let phrases = vec![
            Phrase { speaker: "1".into(), text: "Hi".into() },
            Phrase { speaker: "1".into(), text: "there".into() },
            Phrase { speaker: "2".into(), text: "Hello".into() },
        ];

        assert_eq!(
            diarized_transcript(&phrases),
            "Speaker 1: Hi there\nSpeaker 2: Hello"
        );
        assert_eq!(plain_text(&phrases), "Hi there Hello");
    }

    #[test]
    fn speaker_returning_later_starts_a_new_paragraph() {
        let phrases = vec![
            Phrase { speaker: "A".into(), text: "one".into() },
            Phrase { speaker: "B".into(), text: "two".into() },
            Phrase { speaker: "A".into(), text: "three".into() },
        ];

        assert_eq!(
            diarized_transcript(&phrases),
            "Speaker A: one\nSpeaker B: two\nSpeaker A: three"
        );
    }

    #[test]
    fn parses_utterance_payloads() {
        let payload = json!({
            "status": "completed",
            "utterances": [
                {"speaker": "A", "text": "Good morning."},
                {"speaker": "B", "text": "Morning."},
            ],
        });

        let phrases = parse_payload(&payload).unwrap();
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].speaker, "A");
        assert_eq!(phrases[1].text, "Morning.");
    }

    #[test]
    fn parses_recognized_phrase_payloads() {
        let payload = json!({
            "status": "Succeeded",
            "recognizedPhrases": [
                {"speaker": 1, "nBest": [{"display": "Hi"}, {"display": "hi"}]},
                {"speaker": 1, "nBest": [{"display": "there"}]},
                {"speaker": 2, "nBest": [{"display": "Hello"}]},
            ],
        });

        let phrases = parse_payload(&payload).unwrap();
        assert_eq!(
            diarized_transcript(&phrases),
            "Speaker 1: Hi there\nSpeaker 2: Hello"
        );
    }

    #[test]
    fn unrecognized_payload_shape_is_an_error() {
        let payload = json!({"status": "completed", "words": []});
        assert!(matches!(
            parse_payload(&payload),
            Err(AppError::InvalidProviderResponse(_))
        ));
    }

    #[test]
    fn empty_n_best_is_an_error() {
        let payload = json!({
            "recognizedPhrases": [{"speaker": 1, "nBest": []}],
        });
        assert!(matches!(
            parse_payload(&payload),
            Err(AppError::InvalidProviderResponse(_))
        ));
    }
}
